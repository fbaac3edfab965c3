//! Semantic version probes for installed runtimes.

use once_cell::sync::Lazy;
use tracing::debug;

use super::runner::Session;
use crate::error::SessionError;
use crate::execution::{extract_version, version_pattern, VersionPattern};
use crate::Result;

static PHP_VERSION: Lazy<VersionPattern> =
    Lazy::new(|| version_pattern(r"^PHP\s+(\d+\.\d+\.\d+)").expect("valid php pattern"));
static JAVAC_VERSION: Lazy<VersionPattern> = Lazy::new(|| {
    version_pattern(r"^javac.*?(\d+\.\d+\.\d+(?:_\d+)?)").expect("valid javac pattern")
});
static SCALAC_VERSION: Lazy<VersionPattern> = Lazy::new(|| {
    version_pattern(r"^Scala.*?version.*?(\d+\.\d+\.\d+(?:_\d+)?)").expect("valid scalac pattern")
});
static NODE_VERSION: Lazy<VersionPattern> =
    Lazy::new(|| version_pattern(r"^v?(\d+\.\d+\.\d+)").expect("valid node pattern"));

impl Session {
    /// Run `cmd` and return the first version `pattern` captures from its
    /// output (stdout lines, then stderr lines).
    ///
    /// A non-zero exit fails with [`SessionError::ProbeFailed`]; output with
    /// no matching line fails with [`SessionError::CommandNotFound`].
    pub async fn find_sem_ver(&self, cmd: &str, pattern: &VersionPattern) -> Result<String> {
        self.find_sem_ver_with(cmd, pattern, |version| version).await
    }

    /// Like [`find_sem_ver`](Self::find_sem_ver), passing the match through
    /// `post_parse`.
    pub async fn find_sem_ver_with<F>(&self, cmd: &str, pattern: &VersionPattern, post_parse: F) -> Result<String>
    where
        F: FnOnce(String) -> String + Send,
    {
        let out = self.run_script(cmd, None).await?;
        if matches!(out.exit_code, Some(code) if code != 0) {
            return Err(SessionError::ProbeFailed {
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }

        match extract_version(&out.combined_output(), pattern) {
            Some(version) => {
                debug!(command = %cmd, version = %version, "Found version");
                Ok(post_parse(version))
            }
            None => Err(SessionError::CommandNotFound(cmd.to_string())),
        }
    }

    /// Installed PHP version, from `php -v`.
    pub async fn php_sem_ver(&self) -> Result<String> {
        self.find_sem_ver("php -v", &PHP_VERSION).await
    }

    /// Installed javac version, from `javac -version`, with `_` turned into
    /// `-` (`1.8.0_131` becomes `1.8.0-131`).
    pub async fn javac_sem_ver(&self) -> Result<String> {
        self.find_sem_ver_with("javac -version", &JAVAC_VERSION, |v| v.replace('_', "-"))
            .await
    }

    /// Installed Scala compiler version, from `scalac -version`.
    pub async fn scalac_sem_ver(&self) -> Result<String> {
        self.find_sem_ver("scalac -version", &SCALAC_VERSION).await
    }

    /// Installed Node.js version, from `node -v`.
    pub async fn node_sem_ver(&self) -> Result<String> {
        self.find_sem_ver("node -v", &NODE_VERSION).await
    }

    /// Installed io.js version, from `iojs -v`.
    pub async fn iojs_sem_ver(&self) -> Result<String> {
        self.find_sem_ver("iojs -v", &NODE_VERSION).await
    }
}

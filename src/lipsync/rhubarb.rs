//! Rhubarb Lip Sync recognizer.
//!
//! Runs `rhubarb -f json --recognizer <name> [--dialogFile <dict>] <wav>` and reads the
//! JSON track from stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use super::{LipsyncError, PhonemeRecognizer, VisemeTrack};
use crate::config::LipsyncConfig;

/// Executable name probed in the search directories and on `PATH`.
#[cfg(windows)]
pub const BINARY_NAME: &str = "rhubarb.exe";
/// Executable name probed in the search directories and on `PATH`.
#[cfg(not(windows))]
pub const BINARY_NAME: &str = "rhubarb";

/// Pronunciation dictionary location relative to a search directory.
pub const DICTIONARY_RELATIVE_PATH: &str = "res/sphinx/cmudict-en-us.dict";

/// Located rhubarb installation.
#[derive(Debug, Clone)]
pub struct RhubarbRecognizer {
    binary: PathBuf,
    dictionary: Option<PathBuf>,
    recognizer: String,
}

impl RhubarbRecognizer {
    /// Create a recognizer for a known binary.
    pub fn new(binary: PathBuf, dictionary: Option<PathBuf>, recognizer: impl Into<String>) -> Self {
        Self {
            binary,
            dictionary,
            recognizer: recognizer.into(),
        }
    }

    /// Locate rhubarb and its dictionary once. Returns `None` when the binary is absent.
    pub fn discover(config: &LipsyncConfig) -> Option<Self> {
        let binary = crate::discovery::locate_binary(
            BINARY_NAME,
            config.rhubarb.as_deref(),
            &config.search_dirs,
        )?;
        let dictionary = Self::discover_dictionary(config, &binary);
        if dictionary.is_none() {
            tracing::warn!("pronunciation dictionary not found, running rhubarb without it");
        }
        Some(Self::new(binary, dictionary, config.recognizer.clone()))
    }

    /// Dictionary candidates: explicit path, then each search directory, then the binary's own directory.
    fn discover_dictionary(config: &LipsyncConfig, binary: &Path) -> Option<PathBuf> {
        let relative = Path::new(DICTIONARY_RELATIVE_PATH);
        if config.dictionary.is_some() {
            return crate::discovery::locate_resource(relative, config.dictionary.as_deref(), &[]);
        }
        let mut dirs = config.search_dirs.clone();
        if let Some(parent) = binary.parent() {
            dirs.push(parent.to_path_buf());
        }
        crate::discovery::locate_resource(relative, None, &dirs)
    }

    /// Executable path.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Dictionary path, if one was found.
    pub fn dictionary(&self) -> Option<&Path> {
        self.dictionary.as_deref()
    }

    fn command(&self, wav: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(["-f", "json", "--recognizer"]).arg(&self.recognizer);
        if let Some(dict) = &self.dictionary {
            cmd.arg("--dialogFile").arg(dict);
        }
        cmd.arg(wav);
        cmd
    }
}

#[async_trait]
impl PhonemeRecognizer for RhubarbRecognizer {
    fn name(&self) -> &str {
        "rhubarb"
    }

    async fn recognize(&self, wav: &Path, _dialog: &str) -> Result<VisemeTrack, LipsyncError> {
        let output = self
            .command(wav)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LipsyncError::Recognizer(format!("failed to run {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LipsyncError::Recognizer(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        VisemeTrack::from_json(&stdout)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn config_with_dir(dir: &Path) -> LipsyncConfig {
        LipsyncConfig {
            search_dirs: vec![dir.to_path_buf()],
            ..LipsyncConfig::default()
        }
    }

    #[test]
    fn command_includes_dictionary_when_present() {
        let recognizer = RhubarbRecognizer::new(
            PathBuf::from("/opt/bin/rhubarb"),
            Some(PathBuf::from("/opt/bin/res/sphinx/cmudict-en-us.dict")),
            "phonetic",
        );
        let cmd = recognizer.command(Path::new("/tmp/message_0.wav"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-f",
                "json",
                "--recognizer",
                "phonetic",
                "--dialogFile",
                "/opt/bin/res/sphinx/cmudict-en-us.dict",
                "/tmp/message_0.wav"
            ]
        );
    }

    #[test]
    fn command_omits_dictionary_when_missing() {
        let recognizer = RhubarbRecognizer::new(PathBuf::from("rhubarb"), None, "pocketSphinx");
        let cmd = recognizer.command(Path::new("a.wav"));
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args.len(), 5);
        assert!(!args.iter().any(|a| *a == "--dialogFile"));
    }

    #[test]
    fn discover_finds_binary_and_dictionary_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(BINARY_NAME), b"#!/bin/sh\n").unwrap();
        std::fs::create_dir_all(dir.path().join("res/sphinx")).unwrap();
        std::fs::write(dir.path().join(DICTIONARY_RELATIVE_PATH), "a AH\n").unwrap();

        let found = RhubarbRecognizer::discover(&config_with_dir(dir.path())).unwrap();
        assert_eq!(found.binary(), dir.path().join(BINARY_NAME));
        assert_eq!(
            found.dictionary().unwrap(),
            dir.path().join(DICTIONARY_RELATIVE_PATH)
        );
    }

    #[test]
    fn discover_without_binary_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = LipsyncConfig {
            rhubarb: Some(dir.path().join("missing-rhubarb")),
            search_dirs: vec![dir.path().to_path_buf()],
            ..LipsyncConfig::default()
        };
        // Only meaningful when rhubarb is not installed system-wide.
        if which::which(BINARY_NAME).is_err() {
            assert!(RhubarbRecognizer::discover(&config).is_none());
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recognize_reads_track_from_stdout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-rhubarb");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"mouthCues\":[{\"start\":0,\"end\":0.2,\"value\":\"X\"},{\"start\":0.2,\"end\":0.5,\"value\":\"C\"}]}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let recognizer = RhubarbRecognizer::new(script, None, "phonetic");
        let track = recognizer
            .recognize(&dir.path().join("a.wav"), "hello")
            .await
            .unwrap();
        assert_eq!(track.mouth_cues.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recognize_reports_non_zero_exit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("failing-rhubarb");
        std::fs::write(&script, "#!/bin/sh\necho 'boom' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let recognizer = RhubarbRecognizer::new(script, None, "phonetic");
        let err = recognizer
            .recognize(&dir.path().join("a.wav"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, LipsyncError::Recognizer(msg) if msg.contains("boom")));
    }
}

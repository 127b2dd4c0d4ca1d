//! Commands that change the remote tree: put, rm and mv.

use clap::Args;

use crate::app::App;
use crate::cli::{GlobalArgs, InputSource, OutputSink, Result};
use crate::server::MutationResponse;

// =============================================================================
// Put
// =============================================================================

/// Arguments for the put command.
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Path of the file to create or update.
    pub path: String,

    /// New content. Read from --input-file or stdin when omitted.
    pub content: Option<String>,

    #[command(flatten)]
    pub input: InputSource,

    /// Commit message.
    #[arg(short = 'm', long)]
    pub message: Option<String>,

    #[command(flatten)]
    pub output: OutputSink,
}

impl PutArgs {
    pub async fn run(self, app: &App, _global: &GlobalArgs) -> Result<()> {
        let content = self.input.read(self.content.as_deref()).await?;
        let message = self
            .message
            .unwrap_or_else(|| format!("Update {}", self.path));

        let outcome = app.coordinator().save(&self.path, &content, &message).await?;
        self.output
            .write_json(&MutationResponse::from(outcome), false)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Rm
// =============================================================================

/// Arguments for the rm command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Path of the file to delete.
    pub path: String,

    /// Commit message.
    #[arg(short = 'm', long)]
    pub message: Option<String>,

    #[command(flatten)]
    pub output: OutputSink,
}

impl RmArgs {
    pub async fn run(self, app: &App, _global: &GlobalArgs) -> Result<()> {
        let message = self
            .message
            .unwrap_or_else(|| format!("Delete {}", self.path));

        let outcome = app.coordinator().remove(&self.path, &message).await?;
        self.output
            .write_json(&MutationResponse::from(outcome), false)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Mv
// =============================================================================

/// Arguments for the mv command.
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Existing path.
    pub old_path: String,

    /// Destination path.
    pub new_path: String,

    /// Commit message.
    #[arg(short = 'm', long)]
    pub message: Option<String>,

    #[command(flatten)]
    pub output: OutputSink,
}

impl MvArgs {
    pub async fn run(self, app: &App, _global: &GlobalArgs) -> Result<()> {
        let message = self
            .message
            .unwrap_or_else(|| format!("Move {} to {}", self.old_path, self.new_path));

        let outcome = app
            .coordinator()
            .move_path(&self.old_path, &self.new_path, &message)
            .await?;
        self.output
            .write_json(&MutationResponse::from(outcome), false)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{ContentBackend, MemoryBackend};
    use crate::config::{read_config, ConfigSource};

    fn app(backend: &Arc<MemoryBackend>, dir: &tempfile::TempDir) -> App {
        let config_file = dir.path().join("config.ini");
        std::fs::write(&config_file, "").unwrap();
        let config = read_config(&ConfigSource {
            config_file: Some(config_file),
            ..Default::default()
        })
        .unwrap()
        .config;
        App::with_backend(config, Arc::clone(backend) as Arc<dyn ContentBackend>)
    }

    fn sink(dir: &tempfile::TempDir) -> OutputSink {
        OutputSink {
            file: Some(dir.path().join("out.json")),
        }
    }

    async fn output(dir: &tempfile::TempDir) -> serde_json::Value {
        let text = tokio::fs::read_to_string(dir.path().join("out.json"))
            .await
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_put_rm_mv() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let app = app(&backend, &dir);
        let global = GlobalArgs::default();

        PutArgs {
            path: "a.txt".to_string(),
            content: Some("hello".to_string()),
            input: InputSource::default(),
            message: None,
            output: sink(&dir),
        }
        .run(&app, &global)
        .await
        .unwrap();
        assert_eq!(backend.file("a.txt"), Some(b"hello".to_vec()));
        assert_eq!(output(&dir).await["ok"], true);

        MvArgs {
            old_path: "a.txt".to_string(),
            new_path: "b.txt".to_string(),
            message: Some("rename".to_string()),
            output: sink(&dir),
        }
        .run(&app, &global)
        .await
        .unwrap();
        assert_eq!(backend.file("a.txt"), None);
        assert_eq!(output(&dir).await["previousPath"], "a.txt");

        RmArgs {
            path: "b.txt".to_string(),
            message: None,
            output: sink(&dir),
        }
        .run(&app, &global)
        .await
        .unwrap();
        assert_eq!(backend.file("b.txt"), None);
    }

    #[tokio::test]
    async fn test_rm_missing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let app = app(&backend, &dir);

        let result = RmArgs {
            path: "nope.txt".to_string(),
            message: None,
            output: sink(&dir),
        }
        .run(&app, &GlobalArgs::default())
        .await;
        assert!(result.is_err());
    }
}

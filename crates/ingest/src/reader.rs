use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

pub struct FileReader;

impl FileReader {
    pub async fn read_file(path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "txt" | "md" => {
                let content = fs::read_to_string(path)
                    .await
                    .context(format!("Failed to read file: {:?}", path))?;
                Ok(content)
            }
            _ => anyhow::bail!("Unsupported file format: {}", extension),
        }
    }

    /// Text files under `dir`, sorted by path so the corpus order is fixed.
    pub fn list_directory(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.context(format!("Failed to walk directory: {:?}", dir))?;
            let path = entry.path();

            if entry.file_type().is_file() {
                if let Some(ext) = path.extension() {
                    if ext == "txt" || ext == "md" {
                        files.push(path.to_path_buf());
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Read a file, or every text file in a directory, joined with newlines.
    pub async fn read_corpus(path: &Path) -> Result<String> {
        if path.is_dir() {
            let files = Self::list_directory(path)?;
            if files.is_empty() {
                anyhow::bail!("No .txt or .md files found in {:?}", path);
            }

            let mut texts = Vec::with_capacity(files.len());
            for file in &files {
                texts.push(Self::read_file(file).await?);
            }
            Ok(texts.join("\n"))
        } else {
            Self::read_file(path).await
        }
    }
}

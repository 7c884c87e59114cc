//! Batch file parsing.
//!
//! One job per line. `prompt|output_path` names the output explicitly and the
//! path is used exactly as written; only a bare prompt lands in
//! `<output_dir>/img_<NNN>.jpg`. Blank lines and lines starting with `#` are
//! skipped.

use std::path::{Path, PathBuf};

use crate::batch::JobSpec;
use crate::error::{GenError, Result};

pub fn parse_batch(contents: &str, output_dir: &Path) -> Result<Vec<JobSpec>> {
    let mut specs = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (prompt, output) = match line.split_once('|') {
            Some((prompt, output)) => {
                let output = output.trim();
                if output.is_empty() {
                    return Err(GenError::Manifest {
                        line: index + 1,
                        reason: "empty output path after '|'".into(),
                    });
                }
                (prompt.trim(), PathBuf::from(output))
            }
            None => (line, output_dir.join(format!("img_{:03}.jpg", specs.len()))),
        };

        if prompt.is_empty() {
            return Err(GenError::Manifest {
                line: index + 1,
                reason: "empty prompt".into(),
            });
        }
        specs.push(JobSpec::new(prompt, output));
    }

    Ok(specs)
}

pub fn load_batch(path: &Path, output_dir: &Path) -> Result<Vec<JobSpec>> {
    let contents = std::fs::read_to_string(path)?;
    parse_batch(&contents, output_dir)
}

//! Shared helpers for CLI commands.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use qat_ir::Module;
use qat_ll::{emit, parse};

/// Load a module from an LLVM assembly file.
pub fn load_module(path: &Path) -> Result<Module> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "bc" => anyhow::bail!("Bitcode input is not supported, use LLVM assembly (.ll)"),
        _ => parse(&source).with_context(|| format!("Failed to parse {}", path.display())),
    }
}

/// Write `module` as LLVM assembly to `output`, or to stdout.
pub fn write_module(module: &Module, output: Option<&Path>) -> Result<()> {
    let text = emit(module);
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write file: {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            stdout.flush().context("Failed to write to stdout")
        }
    }
}

/// Write `text` to `path`.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("Failed to write file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = load_module(Path::new("/nonexistent/program.ll")).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_parse_error_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ll");
        fs::write(&path, "define void @Main( {").unwrap();
        let err = load_module(&path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse"));
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ll");
        let output = dir.path().join("out.ll");
        fs::write(&input, "define void @Main() {\nentry:\n  ret void\n}\n").unwrap();

        let module = load_module(&input).unwrap();
        write_module(&module, Some(&output)).unwrap();
        let reloaded = load_module(&output).unwrap();
        assert_eq!(reloaded.num_functions(), 1);
    }
}

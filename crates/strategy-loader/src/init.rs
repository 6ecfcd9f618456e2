use pyo3::prelude::*;
use pyo3::types::PyList;
use std::path::PathBuf;

/// Prepares the embedded Python interpreter's `sys.path` so the
/// allow-listed packages a sandboxed strategy may import (`numpy`, and
/// any site-local helper modules) resolve the same way for every
/// strategy load, regardless of the host process's working directory.
pub fn setup_python(site_packages_path: &str) -> PyResult<()> {
    Python::attach(|py| {
        let sys = py.import("sys")?;
        let path: Bound<'_, PyList> = sys.getattr("path")?.cast_into()?;

        let abs_path = std::fs::canonicalize(site_packages_path)
            .unwrap_or_else(|_| PathBuf::from(site_packages_path));
        let path_str = abs_path.to_string_lossy().to_string();

        if !python_path_contains(&path, &path_str)? {
            path.insert(0, &path_str)?;
            tracing::info!("added to sys.path: {}", path_str);
        }

        tracing::debug!("python sys.path configured");
        Ok(())
    })
}

fn python_path_contains(path: &Bound<'_, PyList>, needle: &str) -> PyResult<bool> {
    for item in path.iter() {
        if item.extract::<String>()? == needle {
            return Ok(true);
        }
    }
    Ok(false)
}

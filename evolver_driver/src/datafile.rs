//! Helpers for the files Evolver reads and writes around a session:
//! scanning dump files for computed values and rewriting parameter
//! assignments in `.fe` datafiles between sweep iterations.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::debug;

/// Read the value of `name` from an Evolver dump file.
///
/// The dump is scanned as whitespace-separated tokens for an assignment of
/// the form `name = value`; the token two places after the name is parsed
/// as the value.
pub fn read_parameter(path: impl AsRef<Path>, name: &str) -> Result<f64> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading dump file {}", path.display()))?;
    let tokens: Vec<&str> = contents.split_whitespace().collect();
    let position = tokens
        .iter()
        .position(|&token| token == name)
        .ok_or_else(|| anyhow!("parameter {:?} not found in {}", name, path.display()))?;
    let value = tokens
        .get(position + 2)
        .ok_or_else(|| anyhow!("parameter {:?} has no value in {}", name, path.display()))?;
    value
        .parse::<f64>()
        .with_context(|| format!("parameter {name:?} value {value:?} is not a number"))
}

/// Rewrite the `name = <number>` assignment in a datafile to `value`.
///
/// Used between sweep iterations to re-run the same datafile with a new
/// parameter, e.g. stepping the Bond number.
pub fn set_parameter(path: impl AsRef<Path>, name: &str, value: f64) -> Result<()> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading datafile {}", path.display()))?;
    let pattern = Regex::new(&format!(r"{} = \S+", regex::escape(name)))
        .context("building parameter pattern")?;
    if !pattern.is_match(&contents) {
        return Err(anyhow!(
            "no assignment of {:?} found in {}",
            name,
            path.display()
        ));
    }
    let replacement = format!("{name} = {value}");
    debug!("Rewriting {:?} in {}: {}", name, path.display(), replacement);
    let rewritten = pattern.replace_all(&contents, replacement.as_str());
    fs::write(path, rewritten.as_bytes())
        .with_context(|| format!("writing datafile {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_parameter_from_dump() {
        let file = write_temp("PARAMETER contact_angle_right = 1.25\nvertices\n");
        let value = read_parameter(file.path(), "contact_angle_right").unwrap();
        assert_eq!(value, 1.25);
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let file = write_temp("vertices\n1 0.0 0.0 0.0\n");
        assert!(read_parameter(file.path(), "contact_angle_right").is_err());
    }

    #[test]
    fn rewrites_parameter_assignment() {
        let file = write_temp("// drop on a sinusoidal surface\nPARAMETER Bo = 0.00\n");
        set_parameter(file.path(), "Bo", 0.05).unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        assert!(contents.contains("Bo = 0.05"));
        assert!(!contents.contains("Bo = 0.00"));
    }

    #[test]
    fn rewrite_and_read_round_trip() {
        let file = write_temp("PARAMETER Bo = 0.1\n");
        set_parameter(file.path(), "Bo", 2.5).unwrap();
        assert_eq!(read_parameter(file.path(), "Bo").unwrap(), 2.5);
    }

    #[test]
    fn rewriting_unknown_parameter_is_an_error() {
        let file = write_temp("PARAMETER Bo = 0.1\n");
        assert!(set_parameter(file.path(), "Re", 1.0).is_err());
    }
}

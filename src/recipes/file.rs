//! Filesystem recipes and path helpers.

use std::path::Path;

use crate::error::{BakeryError, Result};
use crate::recipe::{flatten_role, recipe, RecipeContext, RecipeSpec, RoleValue};
use crate::value::Value;

/// Makes `path` (and any missing parents) if it doesn't already exist.
pub async fn directory(ctx: &RecipeContext, path: impl Into<RoleValue>) -> Result<Value> {
    let path = path.into();
    let spec = RecipeSpec::new("directory").target(path.clone());
    let path_for_body = path.clone();
    recipe(ctx, spec, move |log| async move {
        let dir = single(&path_for_body);
        if !Path::new(&dir).exists() {
            log.trace(format!("Making directory: {dir}"));
            std::fs::create_dir_all(&dir)?;
        }
        if !Path::new(&dir).is_dir() {
            return Err(BakeryError::Internal(format!(
                "file exists but is not a directory: {dir}"
            )));
        }
        Ok(Value::scalar(dir))
    })
    .await
}

/// Copies `src` to `dst`, recursing into directories.
pub async fn copy(
    ctx: &RecipeContext,
    src: impl Into<RoleValue>,
    dst: impl Into<RoleValue>,
) -> Result<Value> {
    let src = src.into();
    let dst = dst.into();
    let spec = RecipeSpec::new("copy").target(dst.clone()).check(src.clone());
    let dst_for_body = dst.clone();
    recipe(ctx, spec, move |log| async move {
        let src_path = single(&src);
        let dst_path = single(&dst_for_body);
        if Path::new(&src_path).is_dir() {
            log.trace(format!("Copying directory: {src_path} --> {dst_path}"));
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            log.trace(format!("Copying file: {src_path} --> {dst_path}"));
            std::fs::copy(&src_path, &dst_path)?;
        }
        Ok(Value::scalar(dst_path))
    })
    .await
}

fn copy_dir_all(src: &str, dst: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = Path::new(dst).join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_all(&entry.path().to_string_lossy(), &dst_path.to_string_lossy())?;
        } else {
            std::fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

fn single(role: &RoleValue) -> String {
    flatten_role(role)
        .into_iter()
        .next()
        .expect("role names exactly one path")
}

/// Replaces a filename's extension, e.g. `swap_ext("src/a.c", "o")` ->
/// `"src/a.o"`.
pub fn swap_ext(filename: &str, ext: &str) -> String {
    format!("{}.{}", drop_ext(filename), ext)
}

/// Drops a filename's extension, e.g. `drop_ext("src/a.c")` -> `"src/a"`.
pub fn drop_ext(filename: &str) -> String {
    let path = Path::new(filename);
    match path.extension() {
        Some(_) => path.with_extension("").to_string_lossy().into_owned(),
        None => filename.to_string(),
    }
}

/// Expands a shell glob pattern into a sorted list of matching paths.
pub fn glob(pattern: &str) -> Result<Vec<String>> {
    let mut matches: Vec<String> = ::glob::glob(pattern)
        .map_err(|e| BakeryError::Internal(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    #[test_case("src/a.c", "o" => "src/a.o"; "simple source file")]
    #[test_case("lib/a.tar.gz", "zip" => "lib/a.tar.zip"; "only the last suffix is swapped")]
    #[test_case("noext", "o" => "noext.o"; "no existing extension")]
    fn swap_ext_replaces_suffix(filename: &str, ext: &str) -> String {
        swap_ext(filename, ext)
    }

    #[test_case("src/a.c" => "src/a"; "simple source file")]
    #[test_case("src/a" => "src/a"; "no extension is a no-op")]
    fn drop_ext_removes_suffix(filename: &str) -> String {
        drop_ext(filename)
    }

    #[tokio::test]
    async fn directory_creates_missing_path() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/child");
        let ctx = RecipeContext::new();
        directory(&ctx, target.to_str().unwrap()).await.unwrap();
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn copy_duplicates_a_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, b"hello").unwrap();
        let ctx = RecipeContext::new();
        copy(&ctx, src.to_str().unwrap(), dst.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello");
    }

    #[test]
    fn glob_expands_and_sorts_matches() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.c"), b"").unwrap();
        std::fs::write(dir.path().join("a.c"), b"").unwrap();
        let pattern = dir.path().join("*.c");
        let matches = glob(pattern.to_str().unwrap()).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].ends_with("a.c"));
        assert!(matches[1].ends_with("b.c"));
    }
}

//! Git recipes.

use crate::error::Result;
use crate::recipe::{recipe, RecipeContext, RecipeSpec, RoleValue};
use crate::shell::{ShellOpts, ShellRunner};
use crate::value::Value;

/// Clones `url` into `repo`.
pub async fn clone(
    ctx: &RecipeContext,
    shell: &ShellRunner,
    url: impl Into<String>,
    repo: impl Into<RoleValue>,
) -> Result<Value> {
    let url = url.into();
    let repo = repo.into();
    let spec = RecipeSpec::new("clone").target(repo.clone());
    let repo_path = match &repo {
        RoleValue::Scalar(s) => s.clone(),
        RoleValue::Seq(items) => items.first().cloned().unwrap_or_default(),
    };
    recipe(ctx, spec, move |log| async move {
        let argv = vec![
            "git".to_string(),
            "clone".to_string(),
            url,
            repo_path.clone(),
        ];
        shell.run(&argv, &ShellOpts::default(), &log).await?;
        Ok(Value::scalar(repo_path))
    })
    .await
}

/// Not a recipe — it declares no output — just a bare shell invocation.
pub async fn submodule_update(shell: &ShellRunner) -> Result<()> {
    let log = crate::joblog::JobLog::new(Some("submodule_update"));
    let argv = vec![
        "git".to_string(),
        "submodule".to_string(),
        "update".to_string(),
        "--init".to_string(),
        "--recursive".to_string(),
    ];
    shell.run(&argv, &ShellOpts::default(), &log).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clone_fails_loudly_for_an_unreachable_remote() {
        let ctx = RecipeContext::new();
        let shell = ShellRunner::with_jobs(1);
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("repo");
        let err = clone(&ctx, &shell, "file:///nonexistent/repo", dst.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::BakeryError::Subprocess { .. }
        ));
    }
}

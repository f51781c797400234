//! C compile/link recipes.

use crate::error::Result;
use crate::recipe::{flatten_role, recipe, RecipeContext, RecipeSpec, RoleValue};
use crate::shell::{ShellOpts, ShellRunner};
use crate::value::Value;

/// Compiler, flags and linker flags a bakefile configures once and passes
/// to every `compile`/`link` call.
#[derive(Clone, Debug)]
pub struct CToolchain {
    pub cc: String,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl Default for CToolchain {
    fn default() -> Self {
        CToolchain {
            cc: "cc".to_string(),
            cflags: Vec::new(),
            ldflags: Vec::new(),
        }
    }
}

impl CToolchain {
    pub fn new(cc: impl Into<String>) -> Self {
        CToolchain {
            cc: cc.into(),
            ..Default::default()
        }
    }

    /// Up to date iff `src`'s mtime doesn't exceed `obj`'s; returns `obj`.
    pub async fn compile(
        &self,
        ctx: &RecipeContext,
        shell: &ShellRunner,
        src: impl Into<RoleValue>,
        obj: impl Into<RoleValue>,
    ) -> Result<Value> {
        let src = src.into();
        let obj = obj.into();
        let spec = RecipeSpec::new("compile")
            .target(obj.clone())
            .check(src.clone())
            .verbose(true);
        let cc = self.cc.clone();
        let cflags = self.cflags.clone();
        let obj_for_body = obj.clone();
        recipe(ctx, spec, move |log| async move {
            let mut argv = vec![cc];
            argv.extend(cflags);
            argv.push("-c".to_string());
            argv.extend(flatten_role(&src));
            argv.push("-o".to_string());
            argv.extend(flatten_role(&obj_for_body));
            shell.run(&argv, &ShellOpts::default(), &log).await?;
            Ok(single_path(&obj_for_body))
        })
        .await
    }

    /// Up to date iff no object's mtime exceeds `executable`'s; returns
    /// `executable`.
    pub async fn link(
        &self,
        ctx: &RecipeContext,
        shell: &ShellRunner,
        objects: impl Into<RoleValue>,
        executable: impl Into<RoleValue>,
    ) -> Result<Value> {
        let objects = objects.into();
        let executable = executable.into();
        let spec = RecipeSpec::new("link")
            .target(executable.clone())
            .check(objects.clone());
        let cc = self.cc.clone();
        let ldflags = self.ldflags.clone();
        let executable_for_body = executable.clone();
        recipe(ctx, spec, move |log| async move {
            let mut argv = vec![cc];
            argv.extend(ldflags);
            argv.extend(flatten_role(&objects));
            argv.push("-o".to_string());
            argv.extend(flatten_role(&executable_for_body));
            shell.run(&argv, &ShellOpts::default(), &log).await?;
            Ok(single_path(&executable_for_body))
        })
        .await
    }
}

fn single_path(role: &RoleValue) -> Value {
    let paths = flatten_role(role);
    Value::scalar(paths.into_iter().next().expect("target role names at least one path"))
}

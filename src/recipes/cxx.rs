//! C++ compile/link recipes — identical shape to `recipes::c`, just a
//! different default compiler.

use crate::error::Result;
use crate::recipe::{flatten_role, recipe, RecipeContext, RecipeSpec, RoleValue};
use crate::shell::{ShellOpts, ShellRunner};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct CxxToolchain {
    pub cxx: String,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl Default for CxxToolchain {
    fn default() -> Self {
        CxxToolchain {
            cxx: "c++".to_string(),
            cflags: Vec::new(),
            ldflags: Vec::new(),
        }
    }
}

impl CxxToolchain {
    pub fn new(cxx: impl Into<String>) -> Self {
        CxxToolchain {
            cxx: cxx.into(),
            ..Default::default()
        }
    }

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
        let cxx = self.cxx.clone();
        let cflags = self.cflags.clone();
        let obj_for_body = obj.clone();
        recipe(ctx, spec, move |log| async move {
            let mut argv = vec![cxx];
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
        let cxx = self.cxx.clone();
        let ldflags = self.ldflags.clone();
        let executable_for_body = executable.clone();
        recipe(ctx, spec, move |log| async move {
            let mut argv = vec![cxx];
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_compiler_is_cpp() {
        assert_eq!(CxxToolchain::default().cxx, "c++");
    }
}

//! Globs `src/*.c`, compiles each with clang, links them into `executable`.
//! Run with `cargo run --example compile_link -- [-c] [TARGET...]` from a
//! directory containing a `src/` folder of C sources.
//!
//! A bakefile is just a [`bakery::injector::Module`] plus a thin binary
//! wiring it into [`bakery::facade::Build`] and [`bakery::cli`].

use std::process::ExitCode;
use std::sync::Arc;

use bakery::facade::{Build, ResourceBuilder};
use bakery::injector::{Module, Resource};
use bakery::recipe::RecipeContext;
use bakery::recipes::{c::CToolchain, file};
use bakery::shell::ShellRunner;
use bakery::value::Value;
use clap::Parser;

struct CompileLinkModule {
    ctx: RecipeContext,
    shell: Arc<ShellRunner>,
    toolchain: CToolchain,
}

impl Module for CompileLinkModule {
    fn resources(&self) -> Vec<Resource> {
        let ctx = self.ctx.clone();
        let shell = self.shell.clone();
        let toolchain = self.toolchain.clone();

        vec![
            ResourceBuilder::new("sources").singleton().provide(|_| async {
                let files = file::glob("src/*.c")?;
                Ok(Value::seq(files))
            }),
            ResourceBuilder::new("objects")
                .temp()
                .inject("sources", "sources")
                .provide({
                    let ctx = ctx.clone();
                    let shell = shell.clone();
                    let toolchain = toolchain.clone();
                    move |params| {
                        let ctx = ctx.clone();
                        let shell = shell.clone();
                        let toolchain = toolchain.clone();
                        async move {
                            let sources = params["sources"].flatten();
                            let items = sources
                                .into_iter()
                                .map(|src| {
                                    let obj = file::swap_ext(&src, "o");
                                    let ctx = ctx.clone();
                                    let shell = shell.clone();
                                    let toolchain = toolchain.clone();
                                    Value::deferred(async move {
                                        toolchain.compile(&ctx, &shell, src, obj).await
                                    })
                                })
                                .collect();
                            Ok(Value::Seq(items))
                        }
                    }
                }),
            ResourceBuilder::new("executable")
                .default()
                .inject("objects", "objects")
                .provide(move |params| {
                    let ctx = ctx.clone();
                    let shell = shell.clone();
                    let toolchain = toolchain.clone();
                    async move {
                        let objects = params["objects"].flatten();
                        toolchain.link(&ctx, &shell, objects, "executable").await
                    }
                }),
        ]
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = bakery::cli::Args::parse();
    bakery::cli::init_logging(args.verbose);

    let mut build = match args.jobs {
        Some(jobs) => Build::with_jobs(jobs),
        None => Build::new(),
    };

    let module = CompileLinkModule {
        ctx: build.recipe_context().clone(),
        shell: build.shell_runner(),
        toolchain: {
            let mut toolchain = CToolchain::new("clang");
            toolchain.cflags.push("-g".to_string());
            toolchain
        },
    };
    build.register(&module);

    bakery::cli::run(args, build).await
}

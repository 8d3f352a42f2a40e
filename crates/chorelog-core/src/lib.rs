pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod render;
pub mod status;
pub mod task;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting chorelog CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(
    files = ?cfg.loaded_files,
    "config resolved"
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let tz =
    datetime::resolve_timezone(&cfg);
  let mut renderer =
    render::Renderer::new(&cfg, tz)?;

  let command = match cli.command {
    | Some(command) => command,
    | None => {
      let name = cfg
        .get("default.command")
        .unwrap_or_else(|| {
          "list".to_string()
        });
      debug!(command = %name, "no explicit command, using default");
      cli::default_command(&name)?
    }
  };

  let mut ctx =
    commands::CommandContext {
      store: &store,
      renderer: &mut renderer,
      tz,
      now: Utc::now()
    };
  commands::dispatch(
    &mut ctx, command
  )?;

  info!("done");
  Ok(())
}

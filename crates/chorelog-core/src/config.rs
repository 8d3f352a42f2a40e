use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const CONFIG_ENV_VAR: &str =
  "CHORELOG_CONFIG";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "default.command".to_string(),
      "list".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );

    Config {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let path = resolve_config_path(
      config_override
    )?;
    if let Some(path) = path {
      info!(config = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no config file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, v) in overrides {
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|v| {
        parse_bool(v).ok_or_else(|| {
          anyhow!(
            "invalid boolean for {key}: \
             {v}"
          )
        })
      })
      .transpose()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let table: toml::Table =
      toml::from_str(&text)
        .with_context(|| {
          format!(
            "invalid config file {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());
    self.merge_table("", &table)
  }

  fn merge_table(
    &mut self,
    prefix: &str,
    table: &toml::Table
  ) -> anyhow::Result<()> {
    for (k, value) in table {
      let key = if prefix.is_empty() {
        k.clone()
      } else {
        format!("{prefix}.{k}")
      };

      let flat = match value {
        | toml::Value::Table(inner) => {
          self.merge_table(&key, inner)?;
          continue;
        }
        | toml::Value::String(s) => {
          s.clone()
        }
        | toml::Value::Integer(i) => {
          i.to_string()
        }
        | toml::Value::Float(f) => {
          f.to_string()
        }
        | toml::Value::Boolean(b) => {
          b.to_string()
        }
        | toml::Value::Datetime(dt) => {
          dt.to_string()
        }
        | toml::Value::Array(_) => {
          return Err(anyhow!(
            "config key {key} may not \
             be an array"
          ));
        }
      };

      trace!(key = %key, value = %flat, "loaded config key");
      self.map.insert(key, flat);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(config_env) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if config_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      config_env
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    return Ok(None);
  };
  let candidate = config_dir
    .join("chorelog")
    .join("config.toml");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".chorelog"))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn defaults_without_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("default.command")
        .as_deref(),
      Some("list")
    );
    assert_eq!(
      cfg.get_bool("color")
        .expect("bool"),
      Some(true)
    );
    assert!(cfg.get("timezone").is_none());
    assert!(cfg.loaded_files.is_empty());
  }

  #[test]
  fn data_location_falls_back_to_home()
  {
    let cfg = Config::default();
    assert!(
      cfg.get("data.location").is_none()
    );

    if let Some(home) = dirs::home_dir()
    {
      assert_eq!(
        default_data_dir()
          .expect("default data dir"),
        home.join(".chorelog")
      );
    }
  }

  #[test]
  fn get_bool_rejects_unknown_words() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(
      cfg.get_bool("color").is_err()
    );
    assert_eq!(
      cfg.get_bool("missing")
        .expect("absent key"),
      None
    );
  }

  #[test]
  fn toml_tables_flatten_to_dotted_keys() {
    let temp =
      tempdir().expect("tempdir");
    let path =
      temp.path().join("config.toml");
    fs::write(
      &path,
      "color = false\n\
       timezone = \"Europe/Berlin\"\n\
       \n\
       [data]\n\
       location = \"/srv/chores\"\n\
       \n\
       [default]\n\
       command = \"overdue\"\n"
    )
    .expect("write config");

    let cfg = Config::load(Some(&path))
      .expect("load config");
    assert_eq!(
      cfg.get("data.location")
        .as_deref(),
      Some("/srv/chores")
    );
    assert_eq!(
      cfg.get("default.command")
        .as_deref(),
      Some("overdue")
    );
    assert_eq!(
      cfg.get_bool("color")
        .expect("bool"),
      Some(false)
    );
    assert_eq!(
      cfg.get("timezone").as_deref(),
      Some("Europe/Berlin")
    );
    assert_eq!(cfg.loaded_files, vec![
      path
    ]);
  }

  #[test]
  fn overrides_win_over_file_values() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "off".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color")
        .expect("bool"),
      Some(false)
    );
  }

  #[test]
  fn arrays_are_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let path =
      temp.path().join("config.toml");
    fs::write(&path, "color = [1, 2]\n")
      .expect("write config");
    assert!(
      Config::load(Some(&path)).is_err()
    );
  }

  #[test]
  fn explicit_data_dir_is_created() {
    let temp =
      tempdir().expect("tempdir");
    let target =
      temp.path().join("nested/data");
    let dir = resolve_data_dir(
      &Config::default(),
      Some(&target)
    )
    .expect("resolve data dir");
    assert_eq!(dir, target);
    assert!(target.is_dir());
  }
}

// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a wharf.yml template with one example environment.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

const TEMPLATE: &str = r#"# Process supervisor used for the reload stage.
supervisor:
  program: pm2
  definition: ecosystem.config.js

environments:
  dev:
    user: deploy
    host: 203.0.113.10
    # key: ~/.ssh/id_deploy
    ssh_options: StrictHostKeyChecking=accept-new
    repo: git@github.com:example/app.git
    ref: origin/dev
    path: /home/deploy/apps/dev
    pre-setup: "ls -la"
    # pre-deploy-local: "npm test"
    post-deploy: "npm ci --omit=dev"
    env:
      NODE_ENV: development
      HTTP_PORT: 4000
      # DB_DSN: {env: DEV_DB_DSN, secret: true}
"#;

/// Write a `wharf.yml` template into `dir`.
pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    tracing::debug!("wrote {}", config_path.display());
    Ok(())
}

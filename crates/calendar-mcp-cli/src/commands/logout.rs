//! `logout`: delete the stored token.

use calendar_mcp_auth::{AuthConfig, CredentialStore};

use crate::error::CliResult;

pub fn run(config: &AuthConfig) -> CliResult<()> {
    let store = CredentialStore::new(&config.credentials_path, &config.token_path);
    if store.delete_token_record()? {
        println!("Removed token {}", config.token_path.display());
    } else {
        println!("No token stored at {}", config.token_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AuthConfig::new()
            .with_credentials_path(tmp.path().join("credentials.json"))
            .with_token_path(tmp.path().join("token.json"));
        std::fs::write(&config.token_path, "{}").unwrap();

        run(&config).unwrap();
        assert!(!config.token_path.exists());
        run(&config).unwrap();
    }
}

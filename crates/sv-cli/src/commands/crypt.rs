use anyhow::{Context, Result};
use std::path::Path;
use sv_config::Config;
use sv_security::Codec;

pub async fn encrypt(config: &Config, path: &Path, remove_original: bool) -> Result<()> {
    let codec = Codec::new(config.encryption_passphrase());
    let target = sv_storage::encrypt_file(&codec, path)
        .await
        .with_context(|| format!("Failed to encrypt {}", path.display()))?;

    if remove_original {
        tokio::fs::remove_file(path).await?;
    }

    println!("✓ Encrypted {} -> {}", path.display(), target.display());
    if remove_original {
        println!("  Removed plaintext");
    }
    Ok(())
}

pub async fn decrypt(config: &Config, path: &Path) -> Result<()> {
    let codec = Codec::new(config.encryption_passphrase());
    let target = sv_storage::decrypt_file(&codec, path)
        .await
        .with_context(|| format!("Failed to decrypt {}", path.display()))?;

    println!("✓ Decrypted {} -> {}", path.display(), target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.security.encryption_key = Some("cli passphrase".to_string());
        config
    }

    #[tokio::test]
    async fn test_encrypt_remove_then_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "card 4111 1111 1111 1111").unwrap();

        encrypt(&config(), &path, true).await.unwrap();
        assert!(!path.exists());

        let encrypted = dir.path().join("report.txt.encrypted");
        decrypt(&config(), &encrypted).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "card 4111 1111 1111 1111"
        );
    }

    #[tokio::test]
    async fn test_decrypt_with_other_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "secret").unwrap();
        encrypt(&config(), &path, false).await.unwrap();

        let mut other = Config::default();
        other.security.encryption_key = Some("different".to_string());
        let encrypted = dir.path().join("report.txt.encrypted");
        assert!(decrypt(&other, &encrypted).await.is_err());
    }
}

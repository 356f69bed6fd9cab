//! TLS configuration and certificate loading.

use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Load TLS configuration from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> io::Result<RustlsConfig> {
    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{what} file not found: {}", path.display()),
            ));
        }
    }

    let config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
    tracing::info!(cert = %cert_path.display(), "TLS certificate loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_certificate() {
        let err = load_tls_config(Path::new("no-such-cert.pem"), Path::new("no-such-key.pem"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("Certificate"));
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(name = "omnitris-server", about = "Two-player omni-directional falling blocks server")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    /// Directory with the built client; `index.html` is the fallback page.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Explicit directory first, then the usual build output locations.
    pub fn resolve_static_dir(&self) -> Option<PathBuf> {
        if let Some(path) = &self.static_dir {
            if path.join("index.html").is_file() {
                return Some(path.clone());
            }
        }
        [PathBuf::from("dist/client"), PathBuf::from("public")]
            .into_iter()
            .find(|path| path.join("index.html").is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::parse_from([
            "omnitris-server",
            "--port",
            "9001",
            "--log-filter",
            "debug",
        ]);
        assert_eq!(config.port, 9001);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.bind_addr().port(), 9001);
    }

    #[test]
    fn missing_static_dir_is_skipped() {
        let config = ServerConfig::parse_from([
            "omnitris-server",
            "--static-dir",
            "/definitely/not/here",
        ]);
        let resolved = config.resolve_static_dir();
        assert_ne!(resolved, Some(PathBuf::from("/definitely/not/here")));
    }
}

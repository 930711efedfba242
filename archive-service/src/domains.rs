//! Tracked-domain allowlist.
//!
//! Capture only runs on hostnames the user has enabled. The list persists
//! as a TOML file next to the database; a missing or unparseable file falls
//! back to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDomain {
    pub domain: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DomainFile {
    #[serde(default)]
    domains: Vec<TrackedDomain>,
}

/// Allowlist manager with TOML persistence.
pub struct DomainRegistry {
    path: Option<PathBuf>,
    domains: Vec<TrackedDomain>,
}

impl DomainRegistry {
    /// In-memory registry with the default domains (for testing).
    pub fn with_defaults() -> Self {
        Self {
            path: None,
            domains: default_domains(),
        }
    }

    /// Load from the given path, creating defaults when absent.
    pub fn load(path: PathBuf) -> Self {
        let domains = match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<DomainFile>(&contents) {
                Ok(file) if !file.domains.is_empty() => {
                    info!("Loaded {} tracked domains from {:?}", file.domains.len(), path);
                    file.domains
                }
                Ok(_) => default_domains(),
                Err(e) => {
                    warn!("Failed to parse domain list: {}, using defaults", e);
                    default_domains()
                }
            },
            Err(_) => {
                info!("No domain list at {:?}, using defaults", path);
                default_domains()
            }
        };
        Self {
            path: Some(path),
            domains,
        }
    }

    /// Hostname lookup: tracked and enabled.
    pub fn is_enabled(&self, hostname: &str) -> bool {
        self.domains
            .iter()
            .any(|d| d.enabled && d.domain == hostname)
    }

    pub fn domains(&self) -> &[TrackedDomain] {
        &self.domains
    }

    pub fn add(&mut self, domain: &str, name: Option<String>) -> std::io::Result<()> {
        if !self.domains.iter().any(|d| d.domain == domain) {
            self.domains.push(TrackedDomain {
                domain: domain.to_string(),
                enabled: true,
                name,
            });
            self.save()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, domain: &str) -> std::io::Result<()> {
        self.domains.retain(|d| d.domain != domain);
        self.save()
    }

    pub fn set_enabled(&mut self, domain: &str, enabled: bool) -> std::io::Result<()> {
        for d in &mut self.domains {
            if d.domain == domain {
                d.enabled = enabled;
            }
        }
        self.save()
    }

    fn save(&self) -> std::io::Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = DomainFile {
            domains: self.domains.clone(),
        };
        let contents = toml::to_string_pretty(&file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, contents)
    }
}

fn default_domains() -> Vec<TrackedDomain> {
    vec![
        TrackedDomain {
            domain: "gemini.google.com".to_string(),
            enabled: true,
            name: Some("Google Gemini".to_string()),
        },
        TrackedDomain {
            domain: "chat.openai.com".to_string(),
            enabled: true,
            name: Some("ChatGPT".to_string()),
        },
        TrackedDomain {
            domain: "chat.deepseek.com".to_string(),
            enabled: true,
            name: Some("DeepSeek".to_string()),
        },
        TrackedDomain {
            domain: "claude.ai".to_string(),
            enabled: true,
            name: Some("Claude".to_string()),
        },
    ]
}

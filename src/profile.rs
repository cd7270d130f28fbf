use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// A named bundle of model id, credential and endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub model_id: String,
    pub credential: String,
    pub endpoint_base: String,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("model_id", &self.model_id)
            .field("credential", &"<redacted>")
            .field("endpoint_base", &self.endpoint_base)
            .finish()
    }
}

/// Read-only view of the profiles, all the chat core needs.
pub trait ProfileSource {
    fn active(&self) -> Option<Profile>;
    fn names(&self) -> BTreeSet<String>;
    fn resolve(&self, name: &str) -> Option<Profile>;
}

/// On-disk record; the key names are part of the persisted layout.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "modelId")]
    pub model_id: String,
    #[serde(rename = "apiKey")]
    pub credential: String,
    #[serde(rename = "baseURL")]
    pub endpoint_base: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilesFile {
    #[serde(default)]
    configs: BTreeMap<String, ProfileRecord>,
    #[serde(default)]
    current_config: Option<String>,
}

/// JSON-file backed profile store.
pub struct ProfileStore {
    path: PathBuf,
    data: ProfilesFile,
}

impl ProfileStore {
    /// Open the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("profile store is corrupted: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProfilesFile::default(),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read profiles: {}", path.display()))
            }
        };
        tracing::debug!(path = %path.display(), "opened profile store");
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.data.configs.is_empty()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.data.current_config.as_deref()
    }

    /// All profiles in name order.
    pub fn profiles(&self) -> Vec<Profile> {
        self.data
            .configs
            .iter()
            .map(|(name, rec)| to_profile(name, rec))
            .collect()
    }

    /// Add a new profile. The first profile becomes the active one.
    pub fn insert(&mut self, profile: Profile) -> anyhow::Result<()> {
        if self.data.configs.contains_key(&profile.name) {
            anyhow::bail!("profile already exists: {}", profile.name);
        }
        let (name, rec) = to_record(profile);
        if self.data.current_config.is_none() {
            self.data.current_config = Some(name.clone());
        }
        self.data.configs.insert(name, rec);
        Ok(())
    }

    /// Replace `old_name` with `profile`, which may carry a new name.
    pub fn update(&mut self, old_name: &str, profile: Profile) -> anyhow::Result<()> {
        if !self.data.configs.contains_key(old_name) {
            anyhow::bail!("no such profile: {old_name}");
        }
        if profile.name != old_name && self.data.configs.contains_key(&profile.name) {
            anyhow::bail!("profile already exists: {}", profile.name);
        }
        self.data.configs.remove(old_name);
        let (name, rec) = to_record(profile);
        if self.data.current_config.as_deref() == Some(old_name) {
            self.data.current_config = Some(name.clone());
        }
        self.data.configs.insert(name, rec);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> anyhow::Result<()> {
        if self.data.configs.remove(name).is_none() {
            anyhow::bail!("no such profile: {name}");
        }
        if self.data.current_config.as_deref() == Some(name) {
            self.data.current_config = None;
        }
        Ok(())
    }

    /// Drop every profile and the active pointer.
    pub fn clear(&mut self) {
        self.data = ProfilesFile::default();
    }

    pub fn set_active(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.data.configs.contains_key(name) {
            anyhow::bail!("no such profile: {name}");
        }
        self.data.current_config = Some(name.to_string());
        Ok(())
    }

    /// Persist atomically (temp file + rename).
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config dir: {}", dir.display()))?;

        let tmp = {
            let mut p = self.path.clone();
            let name = self
                .path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "profiles.json".to_string());
            p.set_file_name(format!("{name}.tmp"));
            p
        };

        let bytes = serde_json::to_vec_pretty(&self.data).context("failed to encode profiles")?;
        std::fs::write(&tmp, bytes).with_context(|| format!("failed to write: {}", tmp.display()))?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace: {}", self.path.display()))?;
        Ok(())
    }
}

impl ProfileSource for ProfileStore {
    fn active(&self) -> Option<Profile> {
        self.resolve(self.data.current_config.as_deref()?)
    }

    fn names(&self) -> BTreeSet<String> {
        self.data.configs.keys().cloned().collect()
    }

    fn resolve(&self, name: &str) -> Option<Profile> {
        self.data.configs.get(name).map(|rec| to_profile(name, rec))
    }
}

fn to_profile(name: &str, rec: &ProfileRecord) -> Profile {
    Profile {
        name: name.to_string(),
        model_id: rec.model_id.clone(),
        credential: rec.credential.clone(),
        endpoint_base: rec.endpoint_base.clone(),
    }
}

fn to_record(p: Profile) -> (String, ProfileRecord) {
    (
        p.name,
        ProfileRecord {
            model_id: p.model_id,
            credential: p.credential,
            endpoint_base: p.endpoint_base,
        },
    )
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to set permissions: {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

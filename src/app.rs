use crate::error::ChatError;
use crate::history::DEFAULT_MAX_HISTORY;
use crate::profile::{Profile, ProfileSource, ProfileStore};
use crate::provider::openai::OpenAiProvider;
use crate::session::{self, Session};
use crate::{config, paths};
use anyhow::Context;
use crossterm::style::Stylize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};
use reqwest::Url;
use std::io::IsTerminal;

const FALLBACK_MODEL: &str = "deepseek-chat";
const FALLBACK_ENDPOINT: &str = "https://api.deepseek.com/v1";

pub fn cmd_add(store: &mut ProfileStore, cfg: Option<&config::Config>) -> anyhow::Result<()> {
    let profile = prompt_profile(store, cfg, None)?;
    let name = profile.name.clone();
    store.insert(profile)?;
    store.save()?;
    println!("{} profile {name}", "Added".green());
    if store.active_name() == Some(name.as_str()) {
        println!("{name} is now the active profile");
    }
    Ok(())
}

pub fn cmd_switch(store: &mut ProfileStore, name: Option<String>) -> anyhow::Result<()> {
    let Some(name) = given_or_picked(store, name, "Switch to profile")? else {
        println!("(no profiles configured; run `deepchat add`)");
        return Ok(());
    };
    store.set_active(&name)?;
    store.save()?;
    println!("{} {name}", "Active profile:".green());
    Ok(())
}

pub fn cmd_edit(
    store: &mut ProfileStore,
    cfg: Option<&config::Config>,
    name: Option<String>,
) -> anyhow::Result<()> {
    let Some(name) = given_or_picked(store, name, "Edit profile")? else {
        println!("(no profiles configured; run `deepchat add`)");
        return Ok(());
    };
    let current = store
        .resolve(&name)
        .with_context(|| format!("no such profile: {name}"))?;

    let updated = prompt_profile(store, cfg, Some(&current))?;
    let new_name = updated.name.clone();
    store.update(&name, updated)?;
    store.save()?;
    println!("{} profile {new_name}", "Updated".green());
    Ok(())
}

pub fn cmd_delete(store: &mut ProfileStore, name: Option<String>) -> anyhow::Result<()> {
    let Some(name) = given_or_picked(store, name, "Delete profile")? else {
        println!("(no profiles configured)");
        return Ok(());
    };
    if store.resolve(&name).is_none() {
        anyhow::bail!("no such profile: {name}");
    }

    if !confirm(&format!("Delete profile {name}?"))? {
        println!("Cancelled");
        return Ok(());
    }
    store.remove(&name)?;
    store.save()?;
    println!("{} profile {name}", "Deleted".green());
    Ok(())
}

pub fn cmd_delete_all(store: &mut ProfileStore) -> anyhow::Result<()> {
    if store.is_empty() && store.active_name().is_none() {
        println!("(no profiles configured)");
        return Ok(());
    }
    if !confirm("Delete ALL profiles?")? {
        println!("Cancelled");
        return Ok(());
    }
    store.clear();
    store.save()?;
    println!("{}", "All profiles deleted".green());
    Ok(())
}

pub fn cmd_list(store: &ProfileStore) -> anyhow::Result<()> {
    let profiles = store.profiles();
    if profiles.is_empty() {
        println!("(no profiles configured; run `deepchat add`)");
        return Ok(());
    }
    for p in &profiles {
        let active = store.active_name() == Some(p.name.as_str());
        let marker = if active { "*" } else { " " };
        let line = format!(
            "{marker} {}\t{}\t{}\t{}",
            p.name,
            p.model_id,
            p.endpoint_base,
            mask_secret(&p.credential)
        );
        if active {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn cmd_info(config_dir: &std::path::Path, store: &ProfileStore) -> anyhow::Result<()> {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("{}", env!("CARGO_PKG_DESCRIPTION"));
    println!("license:  {}", env!("CARGO_PKG_LICENSE"));
    println!("config:   {}", paths::config_path(config_dir).display());
    println!(
        "profiles: {} ({} configured)",
        store.path().display(),
        store.names().len()
    );
    Ok(())
}

pub async fn cmd_chat(
    http: &reqwest::Client,
    store: &mut ProfileStore,
    cfg: Option<&config::Config>,
    max: Option<u32>,
) -> anyhow::Result<()> {
    let profile = match store.active() {
        Some(p) => p,
        None => {
            eprintln!("{} {}", "Warning:".yellow(), ChatError::NoActiveProfile);
            select_profile(store, cfg)?
        }
    };

    let max_history = max
        .map(|m| m as usize)
        .or_else(|| cfg.and_then(|c| c.max_history))
        .unwrap_or(DEFAULT_MAX_HISTORY);
    tracing::info!(profile = %profile.name, model = %profile.model_id, max_history, "starting chat");

    let provider = OpenAiProvider::new(http.clone());
    let mut chat = Session::new(&provider, profile, max_history)
        .with_progress(std::io::stderr().is_terminal());

    let mut out = std::io::stdout();
    chat.run(session::spawn_stdin_reader(), &mut out, || async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::debug!(kept = chat.history().len(), "chat finished");
    Ok(())
}

/// Recover from a missing active profile: pick one, or add one if none exist.
fn select_profile(store: &mut ProfileStore, cfg: Option<&config::Config>) -> anyhow::Result<Profile> {
    let name = match pick_profile(store, "Select a profile")? {
        Some(name) => name,
        None if !store.is_empty() => return Err(ChatError::NoActiveProfile.into()),
        None => {
            println!("No profiles configured yet; let's add one.");
            let profile = prompt_profile(store, cfg, None)?;
            let name = profile.name.clone();
            store.insert(profile)?;
            name
        }
    };
    store.set_active(&name)?;
    store.save()?;
    store.active().context(ChatError::NoActiveProfile)
}

fn pick_profile(store: &ProfileStore, prompt: &str) -> anyhow::Result<Option<String>> {
    let names: Vec<String> = store.names().into_iter().collect();
    if names.is_empty() {
        return Ok(None);
    }
    let default = store
        .active_name()
        .and_then(|a| names.iter().position(|n| n == a))
        .unwrap_or(0);

    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&names)
        .default(default)
        .interact_opt()
        .context("profile selection failed")?;
    Ok(idx.map(|i| names[i].clone()))
}

fn given_or_picked(
    store: &ProfileStore,
    name: Option<String>,
    prompt: &str,
) -> anyhow::Result<Option<String>> {
    match name {
        Some(name) => Ok(Some(name)),
        None => pick_profile(store, prompt),
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("confirmation failed")
}

/// Prompt for every profile field; `current` prefills the values when editing.
fn prompt_profile(
    store: &ProfileStore,
    cfg: Option<&config::Config>,
    current: Option<&Profile>,
) -> anyhow::Result<Profile> {
    let theme = ColorfulTheme::default();
    let original_name = current.map(|p| p.name.clone());
    let taken = store.names();

    let mut name_input = Input::<String>::with_theme(&theme)
        .with_prompt("Profile name")
        .validate_with(move |input: &String| -> Result<(), String> {
            let name = input.trim();
            if name.is_empty() {
                return Err("name must not be empty".to_string());
            }
            if original_name.as_deref() != Some(name) && taken.contains(name) {
                return Err(format!("profile {name} already exists"));
            }
            Ok(())
        });
    if let Some(p) = current {
        name_input = name_input.with_initial_text(p.name.clone());
    }
    let name = name_input.interact_text().context("failed to read profile name")?;

    let default_model = current
        .map(|p| p.model_id.clone())
        .or_else(|| cfg.and_then(|c| c.default_model.clone()))
        .unwrap_or_else(|| FALLBACK_MODEL.to_string());
    let model_id: String = Input::with_theme(&theme)
        .with_prompt("Model id")
        .default(default_model)
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("model id must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .context("failed to read model id")?;

    let credential = match current {
        Some(p) => {
            let entered = Password::with_theme(&theme)
                .with_prompt("API key (leave empty to keep current)")
                .allow_empty_password(true)
                .interact()
                .context("failed to read API key")?;
            if entered.trim().is_empty() {
                p.credential.clone()
            } else {
                entered.trim().to_string()
            }
        }
        None => Password::with_theme(&theme)
            .with_prompt("API key")
            .interact()
            .context("failed to read API key")?
            .trim()
            .to_string(),
    };

    let default_endpoint = current
        .map(|p| p.endpoint_base.clone())
        .or_else(|| cfg.and_then(|c| c.default_endpoint.clone()))
        .unwrap_or_else(|| FALLBACK_ENDPOINT.to_string());
    let endpoint: String = Input::with_theme(&theme)
        .with_prompt("API endpoint base")
        .default(default_endpoint)
        .validate_with(|input: &String| validate_endpoint(input))
        .interact_text()
        .context("failed to read endpoint")?;

    Ok(Profile {
        name: name.trim().to_string(),
        model_id: model_id.trim().to_string(),
        credential,
        endpoint_base: normalize_endpoint(&endpoint),
    })
}

pub fn validate_endpoint(input: &str) -> Result<(), String> {
    let url = Url::parse(input.trim()).map_err(|e| format!("invalid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme: {other}")),
    }
}

pub fn normalize_endpoint(input: &str) -> String {
    input.trim().trim_end_matches('/').to_string()
}

/// Show only the edges of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

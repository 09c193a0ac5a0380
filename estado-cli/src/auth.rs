use anyhow::{Context, Result, bail};
use estado_finance::Provider;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::state::ensure_estado_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AuthState {
    pub anthropic_token: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AuthState {
    fn stored(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Anthropic => self.anthropic_token.as_deref(),
            Provider::OpenAI => self.openai_api_key.as_deref(),
        }
    }
}

pub fn env_var(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::OpenAI => "OPENAI_API_KEY",
    }
}

/// The environment wins over auth.json.
pub fn resolve_key(
    provider: Provider,
    auth: &AuthState,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env(env_var(provider))
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| {
            auth.stored(provider)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
        })
}

pub fn api_key(provider: Provider) -> Result<Option<String>> {
    let auth = load_auth()?;
    Ok(resolve_key(provider, &auth, |name| std::env::var(name).ok()))
}

fn auth_path() -> Result<PathBuf> {
    Ok(ensure_estado_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    let p = auth_path()?;
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_auth(auth: &AuthState) -> Result<()> {
    let p = auth_path()?;
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn anthropic_paste_token() -> Result<()> {
    let mut auth = load_auth()?;
    let token = prompt_secret("Paste Anthropic API key (starts with sk-ant-)")?;
    if !token.starts_with("sk-ant-") {
        bail!("key didn't look like an Anthropic key (expected prefix sk-ant-)");
    }
    auth.anthropic_token = Some(token);
    save_auth(&auth)?;
    println!("Saved Anthropic key to {}", auth_path()?.display());
    Ok(())
}

pub fn openai_paste_api_key() -> Result<()> {
    let mut auth = load_auth()?;
    let key = prompt_secret("Paste OpenAI API key (starts with sk-)")?;
    if !key.starts_with("sk-") {
        bail!("key didn't look like an OpenAI API key (expected prefix sk-)");
    }
    auth.openai_api_key = Some(key);
    save_auth(&auth)?;
    println!("Saved OpenAI API key to {}", auth_path()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> AuthState {
        AuthState {
            anthropic_token: Some("sk-ant-file".into()),
            openai_api_key: Some("  ".into()),
        }
    }

    #[test]
    fn test_environment_wins() {
        let env = |name: &str| (name == "ANTHROPIC_API_KEY").then(|| "sk-ant-env".to_string());
        assert_eq!(resolve_key(Provider::Anthropic, &stored(), env).as_deref(), Some("sk-ant-env"));
    }

    #[test]
    fn test_file_and_blank_keys() {
        let no_env = |_: &str| None;
        assert_eq!(resolve_key(Provider::Anthropic, &stored(), no_env).as_deref(), Some("sk-ant-file"));
        assert_eq!(resolve_key(Provider::OpenAI, &stored(), no_env), None);

        let blank_env = |_: &str| Some(String::new());
        assert_eq!(resolve_key(Provider::Anthropic, &stored(), blank_env).as_deref(), Some("sk-ant-file"));
    }
}

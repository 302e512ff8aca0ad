//! Module manifest parsing.
//!
//! One declaration per line:
//!
//! ```text
//! forge 'https://forgeapi.puppet.com'
//! mod 'puppetlabs-stdlib', '4.13.1'
//! mod 'puppetlabs/ntp'
//! mod 'site_profile', :git => 'git@git.example.com:ops/profile.git', :ref => 'main'
//! ```
//!
//! `:branch`, `:tag` and `:commit` are accepted as aliases of `:ref`.

use std::path::Path;

use crate::error::{Error, Result};

/// Where a module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Module repository package, optionally pinned.
    Package { version: Option<semver::Version> },
    /// Source-control remote at a reference (the remote's default when `None`).
    Git {
        remote: String,
        reference: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapModule {
    pub name: String,
    pub source: ModuleSource,
}

impl BootstrapModule {
    /// Directory name of the module.
    ///
    /// `puppetlabs-stdlib` and `puppetlabs/stdlib` both give `stdlib`.
    pub fn short_name(&self) -> &str {
        let base = self.name.rsplit('/').next().unwrap_or(&self.name);
        base.split_once('-').map(|(_, short)| short).unwrap_or(base)
    }
}

pub fn parse_manifest_file(path: &Path) -> Result<Vec<BootstrapModule>> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    parse_manifest(&std::fs::read_to_string(path)?)
}

pub fn parse_manifest(contents: &str) -> Result<Vec<BootstrapModule>> {
    let mut modules = Vec::new();
    for (idx, raw) in contents.lines().enumerate() {
        let line = idx + 1;
        let parsed = parse_line(raw).map_err(|message| Error::Manifest { line, message })?;
        if let Some(module) = parsed {
            if modules.iter().any(|m: &BootstrapModule| m.name == module.name) {
                return Err(Error::Manifest {
                    line,
                    message: format!("module '{}' is declared twice", module.name),
                });
            }
            modules.push(module);
        }
    }
    Ok(modules)
}

fn parse_line(raw: &str) -> std::result::Result<Option<BootstrapModule>, String> {
    let line = strip_comment(raw).trim();
    if line.is_empty() {
        return Ok(None);
    }
    let keyword = line.split_whitespace().next().unwrap_or_default();
    match keyword {
        "forge" | "moduledir" => return Ok(None),
        "mod" => {}
        other => return Err(format!("unexpected declaration '{}'", other)),
    }

    let args = split_args(line["mod".len()..].trim())?;
    let mut args = args.iter();
    let name = args
        .next()
        .and_then(|arg| unquote(arg))
        .ok_or("module name must be a quoted string")?;
    check_name(&name)?;

    let mut version = None;
    let mut remote = None;
    let mut reference = None;
    for arg in args {
        if let Some(value) = unquote(arg) {
            if version.is_some() || remote.is_some() {
                return Err(format!("unexpected argument '{}'", arg));
            }
            let parsed = semver::Version::parse(&value)
                .map_err(|e| format!("invalid version '{}': {}", value, e))?;
            version = Some(parsed);
            continue;
        }

        let (key, value) = split_option(arg).ok_or_else(|| format!("malformed option '{}'", arg))?;
        match key {
            "git" => remote = Some(value),
            "ref" | "branch" | "tag" | "commit" => {
                check_reference(&value)?;
                if reference.replace(value).is_some() {
                    return Err("more than one reference given".to_string());
                }
            }
            other => return Err(format!("unsupported option ':{}'", other)),
        }
    }

    let source = match (version, remote, reference) {
        (Some(_), Some(_), _) => {
            return Err("a module takes a version or :git, not both".to_string());
        }
        (_, None, Some(_)) => return Err("a reference needs a :git remote".to_string()),
        (version, None, None) => ModuleSource::Package { version },
        (None, Some(remote), reference) => ModuleSource::Git { remote, reference },
    };

    Ok(Some(BootstrapModule { name, source }))
}

/// Module names are `name`, `owner-name` or `owner/name`, each part `[A-Za-z0-9_]+`.
///
/// The short name becomes a directory that the script deletes and recreates,
/// so anything that could resolve outside the module directory is refused.
fn check_name(name: &str) -> std::result::Result<(), String> {
    let parts: Vec<&str> = match name.find(['-', '/']) {
        Some(idx) => vec![&name[..idx], &name[idx + 1..]],
        None => vec![name],
    };
    let valid = parts.iter().all(|part| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if valid {
        Ok(())
    } else {
        Err(format!("invalid module name '{}'", name))
    }
}

/// References end up in `git archive` arguments and archive URLs.
fn check_reference(reference: &str) -> std::result::Result<(), String> {
    if reference.is_empty()
        || reference.starts_with('-')
        || reference.contains("..")
        || reference.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(format!("invalid reference '{}'", reference));
    }
    Ok(())
}

/// Drop a trailing `#` comment that is not inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (idx, c) in line.char_indices() {
        match (quote, c) {
            (None, '#') => return &line[..idx],
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

/// Split on commas outside quotes.
fn split_args(rest: &str) -> std::result::Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    for c in rest.chars() {
        match (quote, c) {
            (None, ',') => {
                args.push(current.trim().to_string());
                current.clear();
                continue;
            }
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
        current.push(c);
    }
    if quote.is_some() {
        return Err("unterminated string".to_string());
    }
    args.push(current.trim().to_string());
    if args.iter().any(String::is_empty) {
        return Err("empty argument".to_string());
    }
    Ok(args)
}

fn unquote(arg: &str) -> Option<String> {
    let first = arg.chars().next()?;
    if !matches!(first, '\'' | '"') || arg.len() < 2 || !arg.ends_with(first) {
        return None;
    }
    let inner = &arg[1..arg.len() - 1];
    if inner.contains(first) {
        return None;
    }
    Some(inner.to_string())
}

/// `:key => 'value'` or `key: 'value'`.
fn split_option(arg: &str) -> Option<(&str, String)> {
    let (key, value) = if let Some(stripped) = arg.strip_prefix(':') {
        let (key, value) = stripped.split_once("=>")?;
        (key.trim(), value.trim())
    } else {
        let (key, value) = arg.split_once(':')?;
        (key.trim(), value.trim())
    };
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, unquote(value)?))
}

//! Where a node lives and how to authenticate to it.
//!
//! A bridge talks to several nodes that rarely share credentials, so each
//! provider URL may carry its own `user:pass@`. Those override the shared
//! [`RpcAuth`] handed to every handler.

use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::error::CoreError;

/// Credentials for a node's JSON-RPC interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RpcAuth {
    #[default]
    Anonymous,
    /// `rpcuser`/`rpcpassword` or an `rpcauth` entry.
    UserPass { user: String, pass: String },
    /// Bitcoin Core's `.cookie` file. Read on every call, since the node
    /// writes a fresh cookie each time it starts.
    Cookie(PathBuf),
}

impl RpcAuth {
    /// Build from optional user, password and cookie path. A user without
    /// a password (or the reverse) is rejected, and so is mixing a
    /// password with a cookie file.
    pub fn from_options(
        user: Option<&str>,
        pass: Option<&str>,
        cookie_file: Option<&Path>,
    ) -> Result<Self, CoreError> {
        match (user, pass, cookie_file) {
            (None, None, None) => Ok(Self::Anonymous),
            (None, None, Some(path)) => Ok(Self::Cookie(path.to_owned())),
            (Some(user), Some(pass), None) => Ok(Self::UserPass {
                user: user.to_owned(),
                pass: pass.to_owned(),
            }),
            (Some(_), Some(_), Some(_)) => Err(CoreError::Config(
                "use either an rpc user/password or a cookie file, not both".into(),
            )),
            _ => Err(CoreError::Config(
                "rpc user and rpc password must be given together".into(),
            )),
        }
    }

    /// Basic-auth pair for the next request, if any.
    pub(super) fn basic_credentials(&self) -> Result<Option<(String, String)>, CoreError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::UserPass { user, pass } => Ok(Some((user.clone(), pass.clone()))),
            Self::Cookie(path) => read_cookie(path).map(Some),
        }
    }
}

fn read_cookie(path: &Path) -> Result<(String, String), CoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("cannot read cookie {}: {e}", path.display())))?;
    content
        .lines()
        .next()
        .and_then(|line| line.trim().split_once(':'))
        .filter(|(user, pass)| !user.is_empty() && !pass.is_empty())
        .map(|(user, pass)| (user.to_owned(), pass.to_owned()))
        .ok_or_else(|| {
            CoreError::Config(format!(
                "cookie {} is not of the form `user:password`",
                path.display()
            ))
        })
}

/// A provider URL with any embedded credentials split off.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct Endpoint {
    /// Base URL without userinfo or trailing slash; wallet paths are
    /// appended to it.
    pub url: String,
    pub auth: Option<RpcAuth>,
}

pub(super) fn parse_endpoint(connection: &str) -> Result<Endpoint, CoreError> {
    let mut url = Url::parse(connection.trim())
        .map_err(|e| CoreError::Config(format!("provider url `{connection}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::Config(format!(
            "provider url `{connection}` must use http or https, not `{}`",
            url.scheme()
        )));
    }

    let auth = match (url.username(), url.password()) {
        ("", None) => None,
        (user, Some(pass)) if !user.is_empty() => Some(RpcAuth::UserPass {
            user: user.to_owned(),
            pass: pass.to_owned(),
        }),
        _ => {
            return Err(CoreError::Config(format!(
                "provider url for host `{}` needs both a user and a password",
                url.host_str().unwrap_or_default()
            )));
        }
    };
    if auth.is_some() {
        // Credentials go in the Authorization header, not the request URL.
        url.set_username("")
            .and_then(|()| url.set_password(None))
            .map_err(|()| CoreError::Config("cannot strip credentials from url".into()))?;
    }

    Ok(Endpoint {
        url: url.as_str().trim_end_matches('/').to_owned(),
        auth,
    })
}

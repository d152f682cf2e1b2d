//! Fix-action message parsing and template token resolution.
//!
//! A machine-rendered violation message looks like
//! `{EX}InsPair;customer;Order;o1;Customer;c1{EX}DelAtom;Draft;d1`.
//! An action starting with `_;` uses `_;` as parameter delimiter instead of
//! `;`, so arguments can carry semicolons.
//!
//! # Invariants
//! - Token substitution is a pure lookup over a closed token set.
//! - Parameters are trimmed; empty actions are skipped.

use super::{FixError, FixResult};
use chrono::{DateTime, Utc};

pub const ACTION_DELIMITER: &str = "{EX}";
pub const PARAM_DELIMITER: &str = ";";
pub const ALT_PARAM_DELIMITER: &str = "_;";
/// Marks a parameter as a template token, e.g. `{token}CURRENT_TIMESTAMP`.
pub const TOKEN_PREFIX: &str = "{token}";

/// Closed set of computed parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateToken {
    /// RFC 3339 UTC timestamp, second precision.
    CurrentTimestamp,
    /// `YYYY-MM-DD` in UTC.
    CurrentDate,
    /// Atom most recently created by this violation's actions.
    LastCreatedId,
    TransactionId,
}

impl TemplateToken {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "CURRENT_TIMESTAMP" => Some(Self::CurrentTimestamp),
            "CURRENT_DATE" => Some(Self::CurrentDate),
            "LAST_CREATED_ID" => Some(Self::LastCreatedId),
            "TRANSACTION_ID" => Some(Self::TransactionId),
            _ => None,
        }
    }
}

/// Values a token may resolve to while one action is dispatched.
#[derive(Debug, Clone, Copy)]
pub struct TokenScope<'a> {
    pub now: DateTime<Utc>,
    pub created_atom: Option<&'a str>,
    pub transaction_id: &'a str,
}

impl TokenScope<'_> {
    pub fn resolve(&self, token: TemplateToken) -> FixResult<String> {
        match token {
            TemplateToken::CurrentTimestamp => Ok(self
                .now
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            TemplateToken::CurrentDate => Ok(self.now.format("%Y-%m-%d").to_string()),
            TemplateToken::LastCreatedId => self
                .created_atom
                .map(str::to_string)
                .ok_or(FixError::NoCreatedAtom),
            TemplateToken::TransactionId => Ok(self.transaction_id.to_string()),
        }
    }
}

/// One parsed action: a procedure name and its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub procedure: String,
    pub args: Vec<String>,
}

/// Splits a machine message into non-empty action strings.
pub fn split_actions(message: &str) -> impl Iterator<Item = &str> {
    message
        .split(ACTION_DELIMITER)
        .map(str::trim)
        .filter(|action| !action.is_empty())
}

/// Splits one action into its procedure name and arguments.
pub fn parse_action(action: &str) -> FixResult<Action> {
    let action = action.trim();
    let (body, delimiter) = match action.strip_prefix(ALT_PARAM_DELIMITER) {
        Some(rest) => (rest, ALT_PARAM_DELIMITER),
        None => (action, PARAM_DELIMITER),
    };

    let mut params = body.split(delimiter).map(|param| param.trim().to_string());
    let procedure = params.next().unwrap_or_default();
    if procedure.is_empty() {
        return Err(FixError::EmptyAction);
    }
    Ok(Action {
        procedure,
        args: params.collect(),
    })
}

/// Replaces a `{token}NAME` parameter by its value; other params pass through.
pub fn resolve_param(param: String, scope: &TokenScope<'_>) -> FixResult<String> {
    let Some(name) = param.strip_prefix(TOKEN_PREFIX) else {
        return Ok(param);
    };
    let name = name.trim();
    let token = TemplateToken::parse(name).ok_or_else(|| FixError::UnknownToken(name.to_string()))?;
    scope.resolve(token)
}

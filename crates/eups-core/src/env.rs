//! The environment-mutation engine
//!
//! [`Env`] is a pure value: a snapshot of the inherited environment plus
//! the mutations applied so far. Actions are applied forward (setup) or
//! inverted (unsetup); nothing here touches the real process environment.
//! After a plan runs, [`Env::diff`] yields the shell-neutral mutation
//! stream the CLI serializes for the calling shell.

use std::collections::BTreeMap;

use crate::table::TableAction;
use crate::{Error, Result};

/// Direction an action is applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// One entry in the serialized environment delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetVar { name: String, value: String },
    UnsetVar { name: String },
    SetAlias { name: String, value: String },
    UnsetAlias { name: String },
}

/// A mutable environment value: variables plus shell aliases.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    initial_vars: BTreeMap<String, String>,
    initial_aliases: BTreeMap<String, String>,
    force: bool,
}

impl Env {
    /// Snapshot the real process environment.
    pub fn from_process() -> Env {
        Env::from_map(std::env::vars().collect())
    }

    /// Build from an explicit variable map (tests, nested evaluation).
    pub fn from_map(vars: BTreeMap<String, String>) -> Env {
        Env {
            initial_vars: vars.clone(),
            vars,
            ..Env::default()
        }
    }

    /// Enable force mode: subsequent mutations forget the variable's
    /// initial value, so the final diff reports them unconditionally.
    pub fn set_force(&mut self, force: bool) {
        self.force = force;
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Set a variable directly (markers, product dir variables).
    pub fn set_var(&mut self, name: &str, value: &str) {
        if self.force {
            self.initial_vars.remove(name);
        }
        self.vars.insert(name.to_string(), value.to_string());
    }

    /// Unset a variable directly.
    pub fn unset_var(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Variables currently set, in sorted order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply one table action in the given direction.
    ///
    /// Returns false when the action was skipped because of an undefined
    /// `$?{VAR}` guard.
    pub fn apply(&mut self, action: &TableAction, direction: Direction) -> Result<bool> {
        let fwd = direction == Direction::Forward;
        match action {
            TableAction::EnvSet { var, value } => {
                if fwd {
                    let Some(value) = self.expand(value)? else {
                        return Ok(false);
                    };
                    self.set_var(var, &value);
                } else {
                    // restore a value that predates this invocation, if we
                    // saw one; otherwise unset
                    match self.initial_vars.get(var) {
                        Some(initial) if Some(initial.as_str()) != self.get(var) => {
                            let initial = initial.clone();
                            self.vars.insert(var.clone(), initial);
                        }
                        _ => self.unset_var(var),
                    }
                }
            }
            TableAction::EnvUnset { var } => {
                if fwd {
                    self.unset_var(var);
                } else if let Some(initial) = self.initial_vars.get(var) {
                    let initial = initial.clone();
                    self.vars.insert(var.clone(), initial);
                }
            }
            TableAction::EnvPrepend { var, value, delim } => {
                return self.apply_path(var, value, delim, fwd, true);
            }
            TableAction::EnvAppend { var, value, delim } => {
                return self.apply_path(var, value, delim, fwd, false);
            }
            TableAction::EnvRemove { var, value, delim } => {
                let Some(value) = self.expand(value)? else {
                    return Ok(false);
                };
                if fwd {
                    self.remove_elements(var, &value, delim);
                } else {
                    return self.apply_path(var, &value, delim, true, false);
                }
            }
            TableAction::AddAlias { name, value } => {
                if fwd {
                    let Some(value) = self.expand(value)? else {
                        return Ok(false);
                    };
                    if self.force {
                        self.initial_aliases.remove(name);
                    }
                    self.aliases.insert(name.clone(), value);
                } else {
                    self.aliases.remove(name);
                }
            }
            TableAction::Print { .. } => {} // handled by the caller
            TableAction::Setup(req) => {
                return Err(Error::internal(format!(
                    "unresolved setup request for {} reached the environment engine",
                    req.product
                )));
            }
        }
        Ok(true)
    }

    /// Shared prepend/append/un-remove path editing with duplicate
    /// suppression and delimiter bookkeeping.
    fn apply_path(
        &mut self,
        var: &str,
        value: &str,
        delim: &str,
        fwd: bool,
        prepend: bool,
    ) -> Result<bool> {
        let Some(value) = self.expand(value)? else {
            return Ok(false);
        };

        // a leading or trailing delimiter on the value is preserved on the
        // final result rather than creating an empty element
        let lead = value.starts_with(delim);
        let trail = value.len() > delim.len() && value.ends_with(delim);
        let value = value
            .trim_start_matches(delim)
            .trim_end_matches(delim)
            .to_string();

        let old = self.get(var).unwrap_or("");
        let old_lead = old.starts_with(delim);
        let old_trail = old.len() > delim.len() && old.ends_with(delim);

        let mut elements: Vec<String> = old
            .split(delim.chars().next().unwrap_or(':'))
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        let new_elements: Vec<String> = value
            .split(delim.chars().next().unwrap_or(':'))
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        if fwd {
            if prepend {
                for element in new_elements.iter().rev() {
                    elements.insert(0, element.clone());
                }
            } else {
                elements.extend(new_elements);
            }
        } else {
            elements.retain(|e| !new_elements.contains(e));
        }

        // duplicate suppression, first occurrence wins
        let mut unique: Vec<String> = Vec::with_capacity(elements.len());
        for element in elements {
            if !unique.contains(&element) {
                unique.push(element);
            }
        }

        let mut joined = unique.join(delim);
        if (lead || old_lead) && !joined.starts_with(delim) {
            joined = format!("{delim}{joined}");
        }
        if (trail || old_trail) && !joined.ends_with(delim) {
            joined.push_str(delim);
        }

        self.set_var(var, &joined);
        Ok(true)
    }

    /// Strip every occurrence of the given elements, collapsing adjacent
    /// separators. A variable left empty stays set (and empty).
    fn remove_elements(&mut self, var: &str, value: &str, delim: &str) {
        let Some(old) = self.get(var) else {
            return;
        };
        let sep = delim.chars().next().unwrap_or(':');
        let remove: Vec<&str> = value.split(sep).filter(|e| !e.is_empty()).collect();
        let kept: Vec<&str> = old
            .split(sep)
            .filter(|e| !e.is_empty() && !remove.contains(e))
            .collect();
        let joined = kept.join(delim);
        self.set_var(var, &joined);
    }

    /// Expand `${VAR}`, `$?{VAR}` and `${VAR-default}` against the current
    /// environment state.
    ///
    /// Returns `Ok(None)` when an optional `$?{VAR}` reference is
    /// undefined: the whole action is skipped, with no partial expansion.
    /// A plain `${VAR}` that is undefined (and has no default) is an error.
    pub fn expand(&self, value: &str) -> Result<Option<String>> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        loop {
            let Some(start) = rest.find('$') else {
                out.push_str(rest);
                return Ok(Some(out));
            };
            out.push_str(&rest[..start]);
            let tail = &rest[start..];

            let (optional, brace_start) = if tail.starts_with("$?{") {
                (true, 3)
            } else if tail.starts_with("${") {
                (false, 2)
            } else {
                out.push('$');
                rest = &tail[1..];
                continue;
            };

            let Some(close) = tail.find('}') else {
                out.push_str(tail);
                return Ok(Some(out));
            };
            let body = &tail[brace_start..close];
            let (name, default) = match body.split_once('-') {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };

            match self.get(name) {
                Some(v) => out.push_str(v),
                None => match default {
                    Some(default) => out.push_str(default),
                    None if optional => return Ok(None),
                    None => {
                        return Err(Error::database(
                            format!("${name} is not defined; unable to expand \"{value}\""),
                            "define the variable or mark the reference optional with $?{...}",
                        ));
                    }
                },
            }
            rest = &tail[close + 1..];
        }
    }

    /// Diff the current state against the starting snapshot.
    pub fn diff(&self) -> Vec<Mutation> {
        let mut out = Vec::new();

        for (name, value) in &self.vars {
            if self.initial_vars.get(name) != Some(value) {
                out.push(Mutation::SetVar {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
        }
        for name in self.initial_vars.keys() {
            if !self.vars.contains_key(name) {
                out.push(Mutation::UnsetVar { name: name.clone() });
            }
        }
        for (name, value) in &self.aliases {
            if self.initial_aliases.get(name) != Some(value) {
                out.push(Mutation::SetAlias {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
        }
        for name in self.initial_aliases.keys() {
            if !self.aliases.contains_key(name) {
                out.push(Mutation::UnsetAlias { name: name.clone() });
            }
        }

        out
    }
}

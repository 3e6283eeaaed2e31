//! Shell syntax generation
//!
//! The engine emits shell-neutral [`Mutation`]s; this is the only place
//! that knows how each shell spells them. Selected by `EUPS_SHELL`.

use eups_core::env::Mutation;
use eups_core::{Error, Result};

/// Shell dialect for command generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellType {
    #[default]
    Sh,
    Csh,
    Zsh,
    Fish,
}

impl std::str::FromStr for ShellType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sh" | "bash" => Ok(ShellType::Sh),
            "csh" | "tcsh" => Ok(ShellType::Csh),
            "zsh" => Ok(ShellType::Zsh),
            "fish" => Ok(ShellType::Fish),
            _ => Err(Error::usage(
                format!("Unknown shell type: {s}"),
                "supported shells: sh, csh, zsh, fish",
            )),
        }
    }
}

impl ShellType {
    /// The shell selected by `EUPS_SHELL`, defaulting to sh.
    pub fn from_env() -> ShellType {
        std::env::var("EUPS_SHELL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Render one mutation as a command for this shell.
    pub fn render(&self, mutation: &Mutation) -> String {
        match mutation {
            Mutation::SetVar { name, value } => match self {
                ShellType::Sh | ShellType::Zsh => {
                    format!("export {name}={}", quote_value(value))
                }
                ShellType::Csh => format!("setenv {name} {}", quote_value(value)),
                ShellType::Fish => format!("set -gx {name} {}", shell_escape(value)),
            },
            Mutation::UnsetVar { name } => match self {
                ShellType::Sh | ShellType::Zsh => format!("unset {name}"),
                ShellType::Csh => format!("unsetenv {name}"),
                ShellType::Fish => format!("set -e {name}"),
            },
            Mutation::SetAlias { name, value } => match self {
                ShellType::Sh => {
                    format!("function {name} {{ {value} ; }}; export -f {name}")
                }
                ShellType::Zsh => format!("function {name} {{ {value} ; }}"),
                ShellType::Csh => {
                    // csh positional arguments are spelled differently
                    let value = value.replace("\"$@\"", "\\!*").replace("$@", "\\!*");
                    format!("alias {name} '{value}'")
                }
                ShellType::Fish => format!("alias {name} {}", shell_escape(value)),
            },
            Mutation::UnsetAlias { name } => match self {
                ShellType::Sh | ShellType::Zsh => format!("unset {name}"),
                ShellType::Csh => format!("unalias {name}"),
                ShellType::Fish => format!("functions -e {name}"),
            },
        }
    }

    /// Render a message echoed to the user through the eval stream.
    pub fn render_echo(&self, text: &str) -> String {
        format!("echo {}", shell_escape(text))
    }
}

/// Quote a value only when the shell would otherwise interpret it.
fn quote_value(value: &str) -> String {
    if value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || "<>|&;()'\"`$*?[]".contains(c))
    {
        shell_escape(value)
    } else {
        value.to_string()
    }
}

/// Escape a string for shell use
pub fn shell_escape(s: &str) -> String {
    // Use single quotes and escape any single quotes in the string
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, value: &str) -> Mutation {
        Mutation::SetVar {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_set_var_per_shell() {
        let m = set("PATH", "/opt/bin:/usr/bin");
        assert_eq!(ShellType::Sh.render(&m), "export PATH=/opt/bin:/usr/bin");
        assert_eq!(ShellType::Csh.render(&m), "setenv PATH /opt/bin:/usr/bin");
        assert_eq!(ShellType::Zsh.render(&m), "export PATH=/opt/bin:/usr/bin");
        assert_eq!(
            ShellType::Fish.render(&m),
            "set -gx PATH '/opt/bin:/usr/bin'"
        );
    }

    #[test]
    fn test_values_with_spaces_are_quoted() {
        let m = set("SETUP_FOO", "foo 1.0 -f Linux64 -Z /opt/stack");
        assert_eq!(
            ShellType::Sh.render(&m),
            "export SETUP_FOO='foo 1.0 -f Linux64 -Z /opt/stack'"
        );
    }

    #[test]
    fn test_unset_per_shell() {
        let m = Mutation::UnsetVar {
            name: "SETUP_FOO".to_string(),
        };
        assert_eq!(ShellType::Sh.render(&m), "unset SETUP_FOO");
        assert_eq!(ShellType::Csh.render(&m), "unsetenv SETUP_FOO");
        assert_eq!(ShellType::Fish.render(&m), "set -e SETUP_FOO");
    }

    #[test]
    fn test_alias_positional_args_for_csh() {
        let m = Mutation::SetAlias {
            name: "fv".to_string(),
            value: "fitsverify \"$@\"".to_string(),
        };
        assert_eq!(ShellType::Csh.render(&m), "alias fv 'fitsverify \\!*'");
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("simple"), "'simple'");
        assert_eq!(shell_escape("it's quoted"), "'it'\\''s quoted'");
    }
}

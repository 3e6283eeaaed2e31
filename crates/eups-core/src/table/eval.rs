//! Table-file evaluation
//!
//! Selects the statements applicable to one (flavor, build type), expands
//! the substitution bag, and interprets action lines into typed
//! [`TableAction`]s. The output is an ordered list; source line order is
//! preserved, and dependency requests stay in place so the resolver can
//! recurse before the remaining actions of the same product.

use std::collections::HashMap;

use crate::flavor;
use crate::product::dir_env_name;
use crate::table::action::{PrintDest, SetupRequest, TableAction, DEFAULT_DELIM};
use crate::table::parser::{ActionLine, Statement, TableFile};
use crate::{Error, Result};

/// Inputs to one evaluation of a table file.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Active flavor
    pub flavor: String,
    /// Active build type (e.g. `build`), if any
    pub build_type: Option<String>,
    /// Substitution variables: `PRODUCT_NAME`, `PRODUCT_DIR`,
    /// `PRODUCT_VERSION`, `PRODUCT_FLAVOR`, `PRODUCTS`, `UPS_DIR`, `UPS_DB`.
    /// Keys with no meaningful value (e.g. `PRODUCT_DIR` of a dirless
    /// product) are simply absent.
    pub bag: HashMap<String, String>,
}

impl EvalContext {
    /// Symbol table for `if (...)` conditions.
    fn symbols(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("flavor".to_string(), self.flavor.clone());
        if let Some(bt) = &self.build_type {
            map.insert("type".to_string(), bt.clone());
            map.insert("build".to_string(), bt.clone());
        }
        map
    }

    /// Expand `${KEY}` / `$?{KEY}` for every key in the bag. Environment
    /// variables are left untouched for the engine to expand.
    fn substitute(&self, value: &str) -> String {
        let mut out = value.to_string();
        for (key, val) in &self.bag {
            if out.contains(key.as_str()) {
                out = out
                    .replace(&format!("${{{key}}}"), val)
                    .replace(&format!("$?{{{key}}}"), val);
            }
        }
        out
    }
}

/// Evaluate a parsed table file into an ordered action list.
pub fn evaluate(table: &TableFile, ctx: &EvalContext) -> Result<Vec<TableAction>> {
    let symbols = ctx.symbols();
    let mut actions = Vec::new();
    let mut matched_block = false;

    for statement in &table.statements {
        match statement {
            Statement::FlavorBlock { flavors, body, .. } => {
                // first matching block wins
                if matched_block {
                    continue;
                }
                if flavors.iter().any(|f| flavor::matches(f, &ctx.flavor)) {
                    matched_block = true;
                    eval_body(table, body, ctx, &symbols, &mut actions)?;
                }
            }
            other => eval_statement(table, other, ctx, &symbols, &mut actions)?,
        }
    }

    if table.has_flavor_blocks && !matched_block {
        return Err(Error::NoMatchingFlavor {
            product: ctx
                .bag
                .get("PRODUCT_NAME")
                .cloned()
                .unwrap_or_else(|| table.path.to_string()),
            version: ctx.bag.get("PRODUCT_VERSION").cloned().unwrap_or_default(),
            flavor: ctx.flavor.clone(),
        });
    }

    Ok(actions)
}

fn eval_body(
    table: &TableFile,
    body: &[Statement],
    ctx: &EvalContext,
    symbols: &HashMap<String, String>,
    out: &mut Vec<TableAction>,
) -> Result<()> {
    for statement in body {
        eval_statement(table, statement, ctx, symbols, out)?;
    }
    Ok(())
}

fn eval_statement(
    table: &TableFile,
    statement: &Statement,
    ctx: &EvalContext,
    symbols: &HashMap<String, String>,
    out: &mut Vec<TableAction>,
) -> Result<()> {
    match statement {
        Statement::Action(line) => {
            if let Some(action) = interpret(table, line, ctx)? {
                out.push(action);
            }
            Ok(())
        }
        Statement::If(chain) => {
            for (cond, body) in &chain.branches {
                if cond.eval(symbols) {
                    return eval_body(table, body, ctx, symbols, out);
                }
            }
            eval_body(table, &chain.else_body, ctx, symbols, out)
        }
        Statement::FlavorBlock { flavors, body, .. } => {
            // nested flavor scoping is rare but legal
            if flavors.iter().any(|f| flavor::matches(f, &ctx.flavor)) {
                eval_body(table, body, ctx, symbols, out)
            } else {
                Ok(())
            }
        }
    }
}

/// Interpret one action line. Returns None for lines that are recognised
/// but contribute nothing (prodDir, declareOptions, unsupported actions).
fn interpret(table: &TableFile, line: &ActionLine, ctx: &EvalContext) -> Result<Option<TableAction>> {
    let file = table.path.as_str();
    let args: Vec<String> = line.args.iter().map(|a| ctx.substitute(a)).collect();

    let require = |n: usize| -> Result<()> {
        if args.len() < n {
            Err(Error::table_parse(
                file,
                line.line,
                format!("{} expected at least {n} argument(s), saw {}", line.name, args.len()),
            ))
        } else {
            Ok(())
        }
    };

    let action = match line.name.as_str() {
        "envset" | "setenv" | "pathset" => {
            require(2)?;
            TableAction::EnvSet {
                var: args[0].clone(),
                value: args[1..].join(" "),
            }
        }
        "envunset" | "unsetenv" => {
            require(1)?;
            // a table file may only unset its own product's directory variable
            let own_dir_var = ctx.bag.get("PRODUCT_NAME").map(|n| dir_env_name(n));
            let mut var = args[0].clone();
            if var == "PRODUCT_DIR" {
                if let Some(own) = &own_dir_var {
                    var = own.clone();
                }
            }
            if own_dir_var.as_deref() != Some(var.as_str()) {
                tracing::warn!("{file}:{}: ignoring attempt to unset ${var}", line.line);
                return Ok(None);
            }
            TableAction::EnvUnset { var }
        }
        "envprepend" | "pathprepend" | "envappend" | "pathappend" => {
            require(2)?;
            if args.len() > 3 {
                return Err(Error::table_parse(
                    file,
                    line.line,
                    format!("{} expected 2 (or 3) arguments, saw {}", line.name, args.join(" ")),
                ));
            }
            let var = args[0].clone();
            let value = args[1].clone();
            let delim = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| DEFAULT_DELIM.to_string());
            if line.name.starts_with("envp") || line.name.starts_with("pathp") {
                TableAction::EnvPrepend { var, value, delim }
            } else {
                TableAction::EnvAppend { var, value, delim }
            }
        }
        "envremove" | "pathremove" => {
            require(2)?;
            TableAction::EnvRemove {
                var: args[0].clone(),
                value: args[1].clone(),
                delim: args
                    .get(2)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_DELIM.to_string()),
            }
        }
        "addalias" => {
            require(2)?;
            TableAction::AddAlias {
                name: args[0].clone(),
                value: args[1..].join(" "),
            }
        }
        "setuprequired" | "setupoptional" => {
            let words: Vec<String> = args
                .iter()
                .flat_map(|a| a.split_whitespace().map(str::to_string))
                .collect();
            let request = SetupRequest::parse(
                &words,
                line.name == "setupoptional",
                file,
                line.line,
            )?;
            TableAction::Setup(request)
        }
        "print" => {
            let (dest, rest) = match args.first().and_then(|w| PrintDest::parse(w)) {
                Some(dest) => (dest, &args[1..]),
                None => (PrintDest::Stdout, &args[..]),
            };
            TableAction::Print {
                dest,
                message: rest.join(" "),
            }
        }
        // absorbed into the engine's own bookkeeping
        "proddir" | "setupenv" => {
            tracing::debug!("{file}:{}: {} is implied and ignored", line.line, line.name);
            return Ok(None);
        }
        "declareoptions" => return Ok(None),
        "sourcerequired" | "unsetuprequired" | "unsetupoptional" => {
            tracing::warn!(
                "{file}:{}: ignoring unsupported directive {}",
                line.line,
                line.name
            );
            return Ok(None);
        }
        other => {
            tracing::warn!("{file}:{}: unexpected action \"{other}\"", line.line);
            return Ok(None);
        }
    };

    Ok(Some(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn eval(text: &str, flavor: &str) -> Result<Vec<TableAction>> {
        let table = TableFile::parse_str(text, Utf8PathBuf::from("test.table")).unwrap();
        let mut ctx = EvalContext {
            flavor: flavor.to_string(),
            build_type: None,
            bag: HashMap::new(),
        };
        ctx.bag
            .insert("PRODUCT_NAME".to_string(), "widget".to_string());
        ctx.bag
            .insert("PRODUCT_DIR".to_string(), "/stack/widget/1.0".to_string());
        evaluate(&table, &ctx)
    }

    #[test]
    fn test_substitution_bag() {
        let actions = eval("envPrepend(PATH, ${PRODUCT_DIR}/bin)", "Linux64").unwrap();
        assert_eq!(
            actions,
            vec![TableAction::EnvPrepend {
                var: "PATH".to_string(),
                value: "/stack/widget/1.0/bin".to_string(),
                delim: ":".to_string(),
            }]
        );
    }

    #[test]
    fn test_first_matching_flavor_block_wins() {
        let text = r#"
Flavor = Linux64
   envSet(WHICH, first)
Flavor = ANY
   envSet(WHICH, second)
"#;
        let actions = eval(text, "Linux64").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0],
            TableAction::EnvSet {
                var: "WHICH".to_string(),
                value: "first".to_string()
            }
        );

        let actions = eval(text, "DarwinX86").unwrap();
        assert_eq!(
            actions[0],
            TableAction::EnvSet {
                var: "WHICH".to_string(),
                value: "second".to_string()
            }
        );
    }

    #[test]
    fn test_no_matching_flavor() {
        let text = "Flavor = Linux\n   envSet(A, 1)\n";
        let err = eval(text, "DarwinX86").unwrap_err();
        assert!(matches!(err, Error::NoMatchingFlavor { .. }));
    }

    #[test]
    fn test_if_blocks_gate_actions() {
        let text = r#"
if (FLAVOR == Linux64) {
   envSet(BITS, 64)
} else {
   envSet(BITS, other)
}
"#;
        let actions = eval(text, "Linux64").unwrap();
        assert_eq!(
            actions[0],
            TableAction::EnvSet {
                var: "BITS".to_string(),
                value: "64".to_string()
            }
        );
        let actions = eval(text, "Darwin").unwrap();
        assert_eq!(
            actions[0],
            TableAction::EnvSet {
                var: "BITS".to_string(),
                value: "other".to_string()
            }
        );
    }

    #[test]
    fn test_setup_requests_stay_in_order() {
        let text = r#"
envSet(BEFORE, 1)
setupRequired(daf_base >= 11.0)
envSet(AFTER, 1)
setupOptional(afwdata)
"#;
        let actions = eval(text, "Linux64").unwrap();
        assert_eq!(actions.len(), 4);
        match &actions[1] {
            TableAction::Setup(req) => {
                assert_eq!(req.product, "daf_base");
                assert_eq!(req.version_expr.as_deref(), Some(">= 11.0"));
                assert!(!req.optional);
            }
            other => panic!("expected setup, got {other:?}"),
        }
        match &actions[3] {
            TableAction::Setup(req) => assert!(req.optional),
            other => panic!("expected setup, got {other:?}"),
        }
    }

    #[test]
    fn test_env_unset_restricted_to_own_dir_var() {
        let actions = eval("envUnset(PATH)", "Linux64").unwrap();
        assert!(actions.is_empty());

        let actions = eval("envUnset(WIDGET_DIR)", "Linux64").unwrap();
        assert_eq!(
            actions,
            vec![TableAction::EnvUnset {
                var: "WIDGET_DIR".to_string()
            }]
        );
    }

    #[test]
    fn test_deprecated_actions_are_noops() {
        let actions = eval("proddir(WIDGET)\nsetupenv(WIDGET)\nenvSet(A, 1)", "Linux64").unwrap();
        assert_eq!(actions.len(), 1);
    }
}

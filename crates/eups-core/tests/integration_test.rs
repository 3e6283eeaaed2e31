//! End-to-end tests over a scratch product stack

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use eups_core::config::Config;
use eups_core::db::{Database, UPS_DB};
use eups_core::env::Env;
use eups_core::resolver::{Plan, ResolveRequest, Resolver};
use eups_core::{Error, Result};

const FLAVOR: &str = "Linux64";

struct Fixture {
    _dir: TempDir,
    stack: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let stack = Utf8PathBuf::from_path_buf(dir.path().join("stack")).unwrap();
        std::fs::create_dir_all(stack.join(UPS_DB)).unwrap();
        Fixture { _dir: dir, stack }
    }

    fn second_stack(&self, name: &str) -> Utf8PathBuf {
        let stack = self.stack.parent().unwrap().join(name);
        std::fs::create_dir_all(stack.join(UPS_DB)).unwrap();
        stack
    }

    fn db(&self) -> Database {
        Database::new(&self.stack, None)
    }

    /// Install a product: real directory, ups/<product>.table, declaration.
    fn install(&self, product: &str, version: &str, table: &str, tags: &[&str]) {
        install_into(&self.stack, product, version, table, tags);
    }
}

fn install_into(stack: &Utf8Path, product: &str, version: &str, table: &str, tags: &[&str]) {
    let prod_dir = stack.join(product).join(version);
    let ups = prod_dir.join("ups");
    std::fs::create_dir_all(&ups).unwrap();
    std::fs::create_dir_all(prod_dir.join("bin")).unwrap();
    std::fs::write(ups.join(format!("{product}.table")), table).unwrap();

    let db = Database::new(stack, None);
    let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    db.declare(
        product,
        version,
        FLAVOR,
        Some(&format!("{product}/{version}")),
        None,
        Some(&format!("{product}.table")),
        &tags,
    )
    .unwrap();
}

fn empty_env() -> Env {
    Env::from_map(BTreeMap::from([(
        "PATH".to_string(),
        "/usr/bin:/bin".to_string(),
    )]))
}

fn setup_request(product: &str, version: Option<&str>) -> ResolveRequest {
    let mut req = ResolveRequest {
        product: product.to_string(),
        flavor: FLAVOR.to_string(),
        ..ResolveRequest::default()
    };
    if let Some(version) = version {
        if version.contains(['<', '>', '=']) {
            req.version_expr = Some(version.to_string());
        } else {
            req.version = Some(version.to_string());
        }
    }
    req
}

fn resolve(databases: &[Database], env: &Env, req: &ResolveRequest) -> Result<Plan> {
    let config = Config::default();
    Resolver::new(databases, env, &config, FLAVOR).resolve_setup(req)
}

fn resolve_unsetup(databases: &[Database], env: &Env, product: &str) -> Result<Plan> {
    let config = Config::default();
    Resolver::new(databases, env, &config, FLAVOR).resolve_unsetup(product, false)
}

const PATH_TABLE: &str = "envPrepend(PATH, ${PRODUCT_DIR}/bin)\n\
                          envSet(${PRODUCT_NAME}_SELECTED, ${PRODUCT_VERSION})\n";

#[test]
fn test_current_tag_and_expression_selection() {
    let fixture = Fixture::new();
    fixture.install("cfitsio", "3.370", PATH_TABLE, &[]);
    fixture.install("cfitsio", "3.450", PATH_TABLE, &["current"]);
    fixture.install("cfitsio", "3.450+hack1", PATH_TABLE, &[]);
    let databases = vec![fixture.db()];

    // a bare `setup cfitsio` follows the current chain
    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("cfitsio", None)).unwrap();
    plan.apply(&mut env).unwrap();
    assert_eq!(env.get("cfitsio_SELECTED"), Some("3.450"));

    // an expression picks the highest match
    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("cfitsio", Some(">= 3.450"))).unwrap();
    plan.apply(&mut env).unwrap();
    assert_eq!(env.get("cfitsio_SELECTED"), Some("3.450+hack1"));
}

#[test]
fn test_sibling_required_constraints_merge() {
    let fixture = Fixture::new();
    fixture.install("daf_base", "11.1", PATH_TABLE, &[]);
    fixture.install("daf_base", "12.1", PATH_TABLE, &[]);
    fixture.install(
        "afw",
        "6.0",
        "setupRequired(daf_base >= 11.0)\n\
         setupRequired(daf_base <= 12.0)\n\
         envSet(AFW_READY, yes)\n",
        &["current"],
    );
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("afw", None)).unwrap();
    plan.apply(&mut env).unwrap();

    // 12.1 satisfies the first edge but not the second; both must hold
    assert_eq!(env.get("daf_base_SELECTED"), Some("11.1"));
    assert_eq!(env.get("AFW_READY"), Some("yes"));
    assert!(env.get("SETUP_DAF_BASE").unwrap().contains("11.1"));
}

#[test]
fn test_unsatisfiable_required_constraints_fail() {
    let fixture = Fixture::new();
    fixture.install("daf_base", "10.0", PATH_TABLE, &[]);
    fixture.install(
        "afw",
        "6.0",
        "setupRequired(daf_base >= 11.0)\n",
        &["current"],
    );
    let databases = vec![fixture.db()];

    let env = empty_env();
    let err = resolve(&databases, &env, &setup_request("afw", None)).unwrap_err();
    assert!(matches!(err, Error::NoMatchingVersion { .. }));
}

#[test]
fn test_version_switch_implies_unsetup() {
    let fixture = Fixture::new();
    fixture.install("foo", "1.0", PATH_TABLE, &[]);
    fixture.install("foo", "1.1", PATH_TABLE, &[]);
    let databases = vec![fixture.db()];

    // activate 1.0
    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("foo", Some("1.0"))).unwrap();
    plan.apply(&mut env).unwrap();
    let bin_10 = format!("{}/foo/1.0/bin", fixture.stack);
    assert!(env.get("PATH").unwrap().contains(&bin_10));

    // switching to 1.1 first unwinds 1.0
    let plan = resolve(&databases, &env, &setup_request("foo", Some("1.1"))).unwrap();
    plan.apply(&mut env).unwrap();

    let marker = env.get("SETUP_FOO").unwrap();
    assert!(marker.contains("foo 1.1"), "marker was {marker}");
    assert!(!env.get("PATH").unwrap().contains(&bin_10));
    assert!(env
        .get("PATH")
        .unwrap()
        .contains(&format!("{}/foo/1.1/bin", fixture.stack)));
    assert_eq!(env.get("foo_SELECTED"), Some("1.1"));
}

#[test]
fn test_setup_unsetup_round_trip() {
    let fixture = Fixture::new();
    fixture.install("dep", "2.0", PATH_TABLE, &["current"]);
    fixture.install(
        "top",
        "1.0",
        "setupRequired(dep)\n\
         envPrepend(PATH, ${PRODUCT_DIR}/bin)\n\
         envPrepend(PYTHONPATH, ${PRODUCT_DIR}/python)\n\
         addAlias(topper, top --run)\n",
        &["current"],
    );
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("top", None)).unwrap();
    plan.apply(&mut env).unwrap();
    assert!(env.is_set("SETUP_TOP"));
    assert!(env.is_set("SETUP_DEP"));
    assert!(!env.diff().is_empty());

    let plan = resolve_unsetup(&databases, &env, "top").unwrap();
    plan.apply(&mut env).unwrap();

    // everything the plan touched is back to its starting value
    assert!(env.diff().is_empty(), "leftover delta: {:?}", env.diff());
}

#[test]
fn test_second_setup_is_idempotent() {
    let fixture = Fixture::new();
    fixture.install("foo", "1.0", PATH_TABLE, &["current"]);
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("foo", Some("1.0"))).unwrap();
    plan.apply(&mut env).unwrap();

    // rebase the snapshot on the post-setup state and set up again
    let mut env2 = Env::from_map(env.vars().map(|(k, v)| (k.to_string(), v.to_string())).collect());
    let plan = resolve(&databases, &env2, &setup_request("foo", Some("1.0"))).unwrap();
    plan.apply(&mut env2).unwrap();
    assert!(env2.diff().is_empty(), "second setup changed: {:?}", env2.diff());
}

#[test]
fn test_independent_setups_commute() {
    let fixture = Fixture::new();
    fixture.install("aaa", "1.0", "envSet(AAA_FLAG, on)\nenvPrepend(AAA_PATH, ${PRODUCT_DIR}/bin)\n", &["current"]);
    fixture.install("bbb", "1.0", "envSet(BBB_FLAG, on)\nenvPrepend(BBB_PATH, ${PRODUCT_DIR}/bin)\n", &["current"]);
    let databases = vec![fixture.db()];

    let run = |order: [&str; 2]| -> BTreeMap<String, String> {
        let mut env = empty_env();
        for product in order {
            let plan = resolve(&databases, &env, &setup_request(product, None)).unwrap();
            plan.apply(&mut env).unwrap();
        }
        env.vars().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    };

    assert_eq!(run(["aaa", "bbb"]), run(["bbb", "aaa"]));
}

#[test]
fn test_earlier_stack_shadows_later_tags() {
    let fixture = Fixture::new();
    let second = fixture.second_stack("stack2");
    fixture.install("foo", "2.0", PATH_TABLE, &[]);
    install_into(&second, "foo", "1.0", PATH_TABLE, &["current"]);

    let databases = vec![fixture.db(), Database::new(&second, None)];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("foo", None)).unwrap();
    plan.apply(&mut env).unwrap();
    assert_eq!(env.get("foo_SELECTED"), Some("2.0"));
    assert!(env.get("SETUP_FOO").unwrap().contains(fixture.stack.as_str()));
}

#[test]
fn test_optional_failures_are_swallowed() {
    let fixture = Fixture::new();
    fixture.install(
        "top",
        "1.0",
        "setupOptional(missing_thing)\n\
         envSet(TOP_READY, yes)\n",
        &["current"],
    );
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("top", None)).unwrap();
    plan.apply(&mut env).unwrap();
    assert_eq!(env.get("TOP_READY"), Some("yes"));
    assert!(!env.is_set("SETUP_MISSING_THING"));
}

#[test]
fn test_required_failure_aborts_whole_plan() {
    let fixture = Fixture::new();
    fixture.install(
        "top",
        "1.0",
        "setupRequired(missing_thing)\nenvSet(TOP_READY, yes)\n",
        &["current"],
    );
    let databases = vec![fixture.db()];

    let env = empty_env();
    assert!(resolve(&databases, &env, &setup_request("top", None)).is_err());
}

#[test]
fn test_mutual_dependency_short_circuits() {
    let fixture = Fixture::new();
    fixture.install("ping", "1.0", "setupRequired(pong 1.0)\nenvSet(PING, up)\n", &["current"]);
    fixture.install("pong", "1.0", "setupRequired(ping 1.0)\nenvSet(PONG, up)\n", &["current"]);
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("ping", None)).unwrap();
    plan.apply(&mut env).unwrap();
    assert_eq!(env.get("PING"), Some("up"));
    assert_eq!(env.get("PONG"), Some("up"));
}

#[test]
fn test_conflicting_cycle_is_an_error() {
    let fixture = Fixture::new();
    fixture.install("ping", "1.0", "setupRequired(pong 1.0)\n", &[]);
    fixture.install("ping", "2.0", PATH_TABLE, &[]);
    fixture.install("pong", "1.0", "setupRequired(ping 2.0)\n", &[]);
    let databases = vec![fixture.db()];

    let env = empty_env();
    let err = resolve(&databases, &env, &setup_request("ping", Some("1.0"))).unwrap_err();
    assert!(matches!(err, Error::Cycle { .. }), "got {err:?}");
}

#[test]
fn test_local_setup_records_local_version() {
    let fixture = Fixture::new();
    let work = fixture.stack.parent().unwrap().join("work/mytool");
    std::fs::create_dir_all(work.join("ups")).unwrap();
    std::fs::write(
        work.join("ups/mytool.table"),
        "envPrepend(PATH, ${PRODUCT_DIR}/bin)\n",
    )
    .unwrap();

    let databases = vec![fixture.db()];
    let mut env = empty_env();
    let req = ResolveRequest {
        product: "mytool".to_string(),
        flavor: FLAVOR.to_string(),
        product_dir: Some(work.clone()),
        ..ResolveRequest::default()
    };
    let plan = resolve(&databases, &env, &req).unwrap();
    plan.apply(&mut env).unwrap();

    let marker = env.get("SETUP_MYTOOL").unwrap();
    assert!(marker.contains(&format!("LOCAL:{work}")), "marker was {marker}");
    assert_eq!(env.get("MYTOOL_DIR"), Some(work.as_str()));

    // nothing was written into the database
    assert!(fixture.db().versions_of("mytool").is_empty());

    // and unsetup still works from the marker alone
    let plan = resolve_unsetup(&databases, &env, "mytool").unwrap();
    plan.apply(&mut env).unwrap();
    assert!(env.diff().is_empty());
}

#[test]
fn test_unsetup_survives_deleted_product_dir() {
    let fixture = Fixture::new();
    fixture.install("gone", "1.0", PATH_TABLE, &["current"]);
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("gone", None)).unwrap();
    plan.apply(&mut env).unwrap();

    // the install vanishes out from under the session
    std::fs::remove_dir_all(fixture.stack.join("gone")).unwrap();

    let plan = resolve_unsetup(&databases, &env, "gone").unwrap();
    plan.apply(&mut env).unwrap();
    assert!(!env.is_set("SETUP_GONE"));
    assert!(!env.is_set("GONE_DIR"));
}

#[test]
fn test_unsetup_of_inactive_product_fails() {
    let fixture = Fixture::new();
    let databases = vec![fixture.db()];
    let env = empty_env();
    assert!(resolve_unsetup(&databases, &env, "never_setup").is_err());
}

#[test]
fn test_missing_table_file_is_an_error() {
    let fixture = Fixture::new();
    fixture.install("broken", "1.0", PATH_TABLE, &["current"]);
    std::fs::remove_file(
        fixture
            .stack
            .join("broken/1.0/ups/broken.table"),
    )
    .unwrap();
    let databases = vec![fixture.db()];

    let env = empty_env();
    let err = resolve(&databases, &env, &setup_request("broken", None)).unwrap_err();
    assert!(matches!(err, Error::TableMissing { .. }), "got {err:?}");
}

#[test]
fn test_dependency_actions_precede_parents_remaining_actions() {
    let fixture = Fixture::new();
    fixture.install("dep", "1.0", "envPrepend(ORDER, dep)\n", &["current"]);
    fixture.install(
        "top",
        "1.0",
        "envPrepend(ORDER, top-before)\n\
         setupRequired(dep)\n\
         envAppend(ORDER, top-after)\n",
        &["current"],
    );
    let databases = vec![fixture.db()];

    let mut env = empty_env();
    let plan = resolve(&databases, &env, &setup_request("top", None)).unwrap();
    plan.apply(&mut env).unwrap();
    assert_eq!(env.get("ORDER"), Some("dep:top-before:top-after"));
}

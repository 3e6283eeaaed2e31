//! Dependency resolution and plan building
//!
//! Starting from one setup (or unsetup) request, the resolver walks the
//! dependency graph depth first, selects one version per product, and
//! emits an ordered [`Plan`]. A dependency's actions fully precede the
//! dependent's remaining actions; within one product, actions keep table
//! source order. Nothing is applied until the whole plan resolves; a fatal
//! error produces no plan at all.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::db::{Database, UPS_DB};
use crate::env::{Direction, Env};
use crate::expr::version_match;
use crate::product::{dir_env_name, setup_env_name, Product};
use crate::session::SessionMarker;
use crate::table::{EvalContext, PrintDest, SetupRequest, TableAction, TableFile};
use crate::{flavor, version, Error, Result};

/// A fully specified root request.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub product: String,
    /// Concrete version, if requested
    pub version: Option<String>,
    /// Relational version expression, if requested
    pub version_expr: Option<String>,
    /// Tags to try, in order, before the configured preferences
    pub tags: Vec<String>,
    pub flavor: String,
    pub build_type: Option<String>,
    /// `-r`: local root outside any database
    pub product_dir: Option<Utf8PathBuf>,
    /// `-m`: explicit table file
    pub table_file: Option<Utf8PathBuf>,
    /// `-j`: no dependencies
    pub just_this: bool,
    /// `-D`: only dependencies, not the product itself
    pub only_dependencies: bool,
    /// `-i`: ignore explicit versions in child table files
    pub ignore_child_versions: bool,
    /// `-F`: override existing session state
    pub force: bool,
}

/// One step of a resolved plan.
#[derive(Debug, Clone)]
pub enum PlanStep {
    /// Record the session marker and product directory variable
    Setup {
        marker: SessionMarker,
        dir: Option<Utf8PathBuf>,
    },
    /// Remove the session marker and product directory variable
    Unsetup { product: String },
    /// Apply one environment action, tagged with its owning product
    Action {
        owner: (String, String),
        action: TableAction,
        direction: Direction,
    },
    /// A `print()` from a table file, surfaced at execution time
    Message { dest: PrintDest, text: String },
}

/// An ordered, fully resolved plan.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    /// Products whose optional setup failed and was skipped
    pub optional_failures: Vec<String>,
}

impl Plan {
    /// Apply every step to an environment value, returning the print
    /// messages encountered.
    pub fn apply(&self, env: &mut Env) -> Result<Vec<(PrintDest, String)>> {
        let mut messages = Vec::new();
        for step in &self.steps {
            match step {
                PlanStep::Setup { marker, dir } => {
                    if let Some(dir) = dir {
                        env.set_var(&dir_env_name(&marker.product), dir.as_str());
                    }
                    env.set_var(&marker.env_name(), &marker.format());
                }
                PlanStep::Unsetup { product } => {
                    env.unset_var(&dir_env_name(product));
                    env.unset_var(&setup_env_name(product));
                }
                PlanStep::Action {
                    owner,
                    action,
                    direction,
                } => {
                    tracing::trace!("{} {}: {action:?} {direction:?}", owner.0, owner.1);
                    env.apply(action, *direction)?;
                }
                PlanStep::Message { dest, text } => {
                    messages.push((*dest, text.clone()));
                }
            }
        }
        Ok(messages)
    }

    /// Products recorded by this plan, in setup order.
    pub fn products(&self) -> Vec<&SessionMarker> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PlanStep::Setup { marker, .. } => Some(marker),
                _ => None,
            })
            .collect()
    }
}

/// The resolver's working state for one invocation.
pub struct Resolver<'a> {
    databases: &'a [Database],
    env: &'a Env,
    config: &'a Config,
    build_type: Option<String>,
    flavor: String,
    ignore_child_versions: bool,
    force: bool,

    frames: Vec<Frame>,
    selected: HashMap<String, String>,
    /// The constraint a selection was made under, for conflict diagnostics
    selection_exprs: HashMap<String, String>,
    optional_failures: Vec<String>,
    steps: Vec<PlanStep>,
}

#[derive(Debug, Clone)]
struct Frame {
    product: String,
    version: String,
}

impl<'a> Resolver<'a> {
    pub fn new(databases: &'a [Database], env: &'a Env, config: &'a Config, flavor: &str) -> Self {
        Resolver {
            databases,
            env,
            config,
            build_type: None,
            flavor: flavor.to_string(),
            ignore_child_versions: false,
            force: false,
            frames: Vec::new(),
            selected: HashMap::new(),
            selection_exprs: HashMap::new(),
            optional_failures: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Resolve a setup request into a plan.
    pub fn resolve_setup(mut self, req: &ResolveRequest) -> Result<Plan> {
        self.build_type = req.build_type.clone();
        self.ignore_child_versions = req.ignore_child_versions;
        self.force = req.force;

        let product = if let Some(dir) = &req.product_dir {
            if !dir.is_dir() {
                return Err(Error::usage(
                    format!("Product {}'s directory {dir} is not a directory", req.product),
                    "pass -r an existing product root",
                ));
            }
            Product::local(&req.product, dir, &self.flavor, req.table_file.clone())
        } else {
            let mut product = self.select_version(
                &req.product,
                req.version.as_deref(),
                req.version_expr.as_deref(),
                &req.tags,
                &[],
            )?;
            if let Some(table) = &req.table_file {
                product.table_file = Some(table.clone());
            }
            product
        };

        self.plan_setup(
            &product,
            0,
            false,
            req.just_this,
            req.only_dependencies,
        )?;
        Ok(Plan {
            steps: self.steps,
            optional_failures: self.optional_failures,
        })
    }

    /// Resolve an unsetup of a currently active product into an inverse plan.
    pub fn resolve_unsetup(mut self, product_name: &str, just_this: bool) -> Result<Plan> {
        self.plan_unsetup(product_name, just_this, 0)?;
        Ok(Plan {
            steps: self.steps,
            optional_failures: self.optional_failures,
        })
    }

    // ---- setup ---------------------------------------------------------

    fn plan_setup(
        &mut self,
        product: &Product,
        depth: usize,
        optional: bool,
        just_this: bool,
        skip_self: bool,
    ) -> Result<()> {
        // a product already on the frame stack is being set up right now:
        // treat the edge as satisfied, unless it demands a different version
        if let Some(frame) = self.frames.iter().find(|f| f.product == product.name) {
            if frame.version == product.version {
                tracing::debug!("{} is already on the setup stack; skipping", product.name);
                return Ok(());
            }
            let mut cycle: Vec<String> = self.frames.iter().map(|f| f.product.clone()).collect();
            cycle.push(product.name.clone());
            return Err(Error::Cycle { products: cycle });
        }

        // consistency with an earlier selection in this invocation
        if let Some(selected) = self.selected.get(&product.name) {
            if selected == &product.version {
                return Ok(());
            }
            if optional {
                tracing::warn!(
                    "optional {} {} skipped; version {} is already selected",
                    product.name,
                    product.version,
                    selected
                );
                self.optional_failures.push(product.name.clone());
                return Ok(());
            }
            return Err(Error::InconsistentVersions {
                product: product.name.clone(),
                selected: selected.clone(),
                requested: product.version.clone(),
            });
        }

        // session state: one active version per product at any time
        let setup_var = setup_env_name(&product.name);
        if let Some(value) = self.env.get(&setup_var) {
            match SessionMarker::parse(&product.name, value) {
                Ok(marker) if marker.version == product.version && depth > 0 && !self.force => {
                    tracing::debug!(
                        "{} {} is already setup; skipping",
                        product.name,
                        product.version
                    );
                    self.selected
                        .insert(product.name.clone(), product.version.clone());
                    return Ok(());
                }
                Ok(marker) => {
                    if depth > 0 && marker.version != product.version {
                        tracing::warn!(
                            "{} {} is currently setup; overriding with {}",
                            product.name,
                            marker.version,
                            product.version
                        );
                    }
                    self.plan_unsetup(&product.name, just_this, depth)
                        .unwrap_or_else(|e| {
                            tracing::warn!("unable to unsetup {} first: {e}", product.name);
                        });
                }
                Err(e) => {
                    tracing::warn!("ignoring malformed {setup_var}: {e}");
                }
            }
        }

        self.selected
            .insert(product.name.clone(), product.version.clone());
        self.frames.push(Frame {
            product: product.name.clone(),
            version: product.version.clone(),
        });

        let result = self.plan_setup_body(product, depth, just_this, skip_self);
        self.frames.pop();
        result
    }

    fn plan_setup_body(
        &mut self,
        product: &Product,
        depth: usize,
        just_this: bool,
        skip_self: bool,
    ) -> Result<()> {
        if !skip_self {
            let mut marker = SessionMarker::new(
                &product.name,
                &product.version,
                &product.flavor,
                product.stack_root.as_ref().map(|p| p.as_str()),
            );
            marker.tag = product.tags.first().cloned();
            self.steps.push(PlanStep::Setup {
                marker,
                dir: product.dir.clone(),
            });
        }

        let actions = self.load_actions(product, Direction::Forward)?;

        // constraints from every required edge of this table, merged so a
        // greedy pick for one edge cannot contradict a sibling edge
        let mut sibling_exprs: HashMap<&str, Vec<&str>> = HashMap::new();
        if !self.ignore_child_versions {
            for action in &actions {
                if let TableAction::Setup(request) = action {
                    if !request.optional {
                        if let Some(expr) = &request.version_expr {
                            sibling_exprs
                                .entry(request.product.as_str())
                                .or_default()
                                .push(expr.as_str());
                        }
                    }
                }
            }
        }
        let sibling_exprs: HashMap<String, Vec<String>> = sibling_exprs
            .into_iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    v.into_iter().map(str::to_string).collect(),
                )
            })
            .collect();

        for action in actions {
            match action {
                TableAction::Setup(request) => {
                    if just_this || depth >= MAX_DEPTH {
                        continue;
                    }
                    let constraints = sibling_exprs
                        .get(&request.product)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    self.plan_child(product, &request, depth, constraints)?;
                }
                TableAction::Print { dest, message } => {
                    if !skip_self {
                        self.steps.push(PlanStep::Message {
                            dest,
                            text: message,
                        });
                    }
                }
                action => {
                    if !skip_self {
                        self.steps.push(PlanStep::Action {
                            owner: (product.name.clone(), product.version.clone()),
                            action,
                            direction: Direction::Forward,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve and plan one dependency edge. Optional edges swallow their
    /// whole subtree's failure; required edges abort the plan.
    fn plan_child(
        &mut self,
        parent: &Product,
        request: &SetupRequest,
        depth: usize,
        constraints: &[String],
    ) -> Result<()> {
        let steps_mark = self.steps.len();
        let selected_mark = self.selected.clone();

        let result = self.plan_child_inner(request, depth, constraints);
        match result {
            Ok(()) => Ok(()),
            Err(e) if request.optional => {
                // roll the partial subtree back and move on
                self.steps.truncate(steps_mark);
                self.selected = selected_mark;
                self.optional_failures.push(request.product.clone());
                tracing::info!(
                    "optional setup {} requested by {} {} failed: {e}",
                    request.product,
                    parent.name,
                    parent.version
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn plan_child_inner(
        &mut self,
        request: &SetupRequest,
        depth: usize,
        constraints: &[String],
    ) -> Result<()> {
        if let Some(flavor) = &request.flavor {
            if flavor != &self.flavor {
                tracing::warn!(
                    "ignoring flavor {flavor} requested for {}; using {}",
                    request.product,
                    self.flavor
                );
            }
        }

        // an earlier selection in this invocation is reused when it
        // satisfies the new request, and is a conflict otherwise
        if let Some(selected) = self.selected.get(&request.product).cloned() {
            let satisfied = match (&request.version, &request.version_expr) {
                (_, Some(expr)) => version_match(&selected, expr)?,
                (Some(version), None) => *version == selected,
                (None, None) => true,
            };
            if satisfied {
                let requested = describe_request(request);
                if let Some(prior) = self.selection_exprs.get(&request.product) {
                    if !requested.is_empty() && prior != &requested {
                        tracing::warn!(
                            "{} is selected as {selected} via \"{prior}\"; \
                             the request \"{requested}\" is also satisfied",
                            request.product
                        );
                    }
                }
                return Ok(());
            }
            // an unsatisfiable edge back into the in-flight stack is a
            // true cycle; a conflict with a completed subtree is not
            if self.frames.iter().any(|f| f.product == request.product) {
                let mut cycle: Vec<String> =
                    self.frames.iter().map(|f| f.product.clone()).collect();
                cycle.push(request.product.clone());
                return Err(Error::Cycle { products: cycle });
            }
            return Err(Error::InconsistentVersions {
                product: request.product.clone(),
                selected,
                requested: describe_request(request),
            });
        }

        let child = if let Some(dir) = &request.product_dir {
            let expanded = self
                .env
                .expand(dir)?
                .ok_or_else(|| Error::no_such_product(&request.product))?;
            Product::local(&request.product, Utf8Path::new(&expanded), &self.flavor, None)
        } else {
            let (version, expr) = if self.ignore_child_versions {
                (None, None)
            } else {
                (request.version.as_deref(), request.version_expr.as_deref())
            };
            self.select_version(&request.product, version, expr, &request.tags, constraints)?
        };

        self.plan_setup(&child, depth + 1, request.optional, request.no_recursion, false)
    }

    // ---- unsetup -------------------------------------------------------

    fn plan_unsetup(&mut self, product_name: &str, just_this: bool, depth: usize) -> Result<()> {
        if self.frames.iter().any(|f| f.product == product_name) {
            return Ok(());
        }

        let setup_var = setup_env_name(product_name);
        let Some(value) = self.env.get(&setup_var) else {
            return Err(Error::NoSuchProduct {
                product: product_name.to_string(),
                help: Some("the product is not currently setup".to_string()),
            });
        };
        let marker = SessionMarker::parse(product_name, value)?;

        let product = self.recorded_product(product_name, &marker);

        // integrity: the recorded directory should still be what the
        // session says it is
        let dir_var = dir_env_name(product_name);
        let env_dir = self.env.get(&dir_var);
        let resolved_dir = product.as_ref().and_then(|p| p.dir.as_ref());
        if let (Some(env_dir), Some(resolved)) = (env_dir, resolved_dir) {
            if env_dir != resolved.as_str() {
                tracing::warn!(
                    "state mismatch for {product_name}: {dir_var}={env_dir} but the recorded \
                     product directory is {resolved}; proceeding"
                );
            }
        }

        self.frames.push(Frame {
            product: product_name.to_string(),
            version: marker.version.clone(),
        });

        self.steps.push(PlanStep::Unsetup {
            product: product_name.to_string(),
        });

        let result = (|| -> Result<()> {
            let Some(product) = product else {
                return Ok(()); // best-effort: markers removed, nothing else known
            };
            let actions = self.load_actions(&product, Direction::Inverse)?;
            for action in actions {
                match action {
                    TableAction::Setup(request) => {
                        if just_this || depth >= MAX_DEPTH {
                            continue;
                        }
                        if self.env.is_set(&setup_env_name(&request.product)) {
                            if let Err(e) =
                                self.plan_unsetup(&request.product, request.no_recursion, depth + 1)
                            {
                                tracing::info!("unable to unsetup {}: {e}", request.product);
                            }
                        }
                    }
                    TableAction::Print { .. } => {} // setup-time messages only
                    action => {
                        self.steps.push(PlanStep::Action {
                            owner: (product.name.clone(), product.version.clone()),
                            action,
                            direction: Direction::Inverse,
                        });
                    }
                }
            }
            Ok(())
        })();

        self.frames.pop();
        result
    }

    /// Reconstruct the product a session marker refers to, preferring the
    /// recorded database but falling back to the directory recorded in the
    /// environment (the database may have been reorganised since).
    fn recorded_product(&self, name: &str, marker: &SessionMarker) -> Option<Product> {
        let flavor = marker.flavor.clone().unwrap_or_else(|| self.flavor.clone());

        if marker.is_local() {
            let dir = marker.version.trim_start_matches(crate::product::LOCAL_VERSION_PREFIX);
            let product = Product::local(name, Utf8Path::new(dir), &flavor, marker.table_file.clone());
            return Some(product);
        }

        if let Some(stack_root) = &marker.stack_root {
            if let Some(db) = self
                .databases
                .iter()
                .find(|db| &db.stack_root == stack_root)
            {
                if let Ok(mut product) = find_with_fallbacks(db, name, &marker.version, &flavor) {
                    if let Some(table) = &marker.table_file {
                        product.table_file = Some(table.clone());
                    }
                    return Some(product);
                }
            }
            tracing::warn!(
                "state mismatch for {name}: version {} is not declared under {stack_root}; \
                 falling back to the recorded product directory",
                marker.version
            );
        }

        // fall back to the environment's record of the product directory
        let dir = self.env.get(&dir_env_name(name))?;
        let dir = Utf8PathBuf::from(dir);
        let table = marker
            .table_file
            .clone()
            .or_else(|| {
                let deduced = dir.join("ups").join(format!("{name}.table"));
                deduced.is_file().then_some(deduced)
            });
        Some(Product {
            name: name.to_string(),
            version: marker.version.clone(),
            flavor,
            dir: Some(dir),
            table_file: table,
            stack_root: marker.stack_root.clone(),
            tags: Vec::new(),
        })
    }

    // ---- shared --------------------------------------------------------

    /// Read and evaluate a product's table file into actions.
    fn load_actions(&self, product: &Product, direction: Direction) -> Result<Vec<TableAction>> {
        let Some(table_path) = &product.table_file else {
            return Ok(Vec::new()); // declared with TABLE_FILE = none
        };

        let table = match TableFile::parse(table_path) {
            Ok(table) => table,
            Err(Error::TableMissing { file }) if direction == Direction::Inverse => {
                // best-effort inverse: the install may be gone entirely
                tracing::warn!(
                    "state mismatch for {}: table file {file} no longer exists; \
                     removing markers only",
                    product.name
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut ctx = EvalContext {
            flavor: product.flavor.clone(),
            build_type: self.build_type.clone(),
            bag: HashMap::new(),
        };
        ctx.bag
            .insert("PRODUCT_NAME".to_string(), product.name.clone());
        ctx.bag
            .insert("PRODUCT_VERSION".to_string(), product.version.clone());
        ctx.bag
            .insert("PRODUCT_FLAVOR".to_string(), product.flavor.clone());
        if let Some(dir) = &product.dir {
            ctx.bag.insert("PRODUCT_DIR".to_string(), dir.to_string());
        }
        if let Some(parent) = table_path.parent() {
            ctx.bag.insert("UPS_DIR".to_string(), parent.to_string());
        }
        if let Some(root) = &product.stack_root {
            ctx.bag.insert("PRODUCTS".to_string(), root.to_string());
            ctx.bag
                .insert("UPS_DB".to_string(), root.join(UPS_DB).to_string());
        }

        crate::table::evaluate(&table, &ctx)
    }

    /// Select one version of a product across the stack path. Every
    /// expression in `constraints` must hold as well (sibling required
    /// edges from the same table file).
    fn select_version(
        &mut self,
        name: &str,
        version: Option<&str>,
        expr: Option<&str>,
        tags: &[String],
        constraints: &[String],
    ) -> Result<Product> {
        // a concrete version that satisfies every expression wins outright
        if let (Some(version), Some(expr)) = (version, expr) {
            if version_match(version, expr)? && matches_all(version, constraints)? {
                if let Ok(product) = self.find_declared(name, version) {
                    return Ok(product);
                }
            }
        }

        if let Some(expr) = expr.or_else(|| {
            version.filter(|v| v.contains(['<', '>', '=']))
        }) {
            return self.select_by_expression(name, expr, constraints);
        }

        if let Some(version) = version {
            return self.find_declared(name, version);
        }

        let mut tag_order: Vec<&str> = tags.iter().map(String::as_str).collect();
        for tag in &self.config.preferred_tags {
            if !tag_order.contains(&tag.as_str()) {
                tag_order.push(tag);
            }
        }

        if !tags.is_empty() {
            // an explicit tag request scans the whole path for that tag
            for tag in &tag_order {
                for db in self.databases {
                    if let Some(version) = db.resolve_tag(name, tag, &self.flavor) {
                        let mut product = find_with_fallbacks(db, name, &version, &self.flavor)?;
                        product.tags.insert(0, tag.to_string());
                        product.tags.dedup();
                        return Ok(product);
                    }
                }
            }
            return Err(Error::NoMatchingVersion {
                product: name.to_string(),
                expr: format!("tag {}", tags.join(", ")),
            });
        }

        // default resolution: the first stack that declares the product
        // shadows the rest; within it prefer the configured tags, then the
        // highest declared version
        let mut best_err: Option<Error> = None;
        for db in self.databases {
            let versions = db.versions_of(name);
            if versions.is_empty() {
                continue;
            }
            for tag in &tag_order {
                if let Some(version) = db.resolve_tag(name, tag, &self.flavor) {
                    match find_with_fallbacks(db, name, &version, &self.flavor) {
                        Ok(mut product) => {
                            product.tags.insert(0, tag.to_string());
                            product.tags.dedup();
                            return Ok(product);
                        }
                        Err(e) => best_err = Some(e),
                    }
                }
            }
            let mut candidates: Vec<&String> = versions.iter().collect();
            candidates.sort_by(|a, b| version::compare(b, a).then(a.cmp(b)));
            for candidate in candidates {
                match find_with_fallbacks(db, name, candidate, &self.flavor) {
                    Ok(product) => return Ok(product),
                    Err(e) => best_err = Some(e),
                }
            }
        }

        Err(best_err.unwrap_or_else(|| Error::no_such_product(name)))
    }

    /// Find a concrete (product, version) in stack order.
    fn find_declared(&self, name: &str, version: &str) -> Result<Product> {
        let mut best_err: Option<Error> = None;
        let mut found: Option<Product> = None;
        for db in self.databases {
            match find_with_fallbacks(db, name, version, &self.flavor) {
                Ok(product) => {
                    match &found {
                        None => found = Some(product),
                        Some(first) => {
                            // shadowed duplicate; warn when the records disagree
                            if first.dir != product.dir {
                                tracing::warn!(
                                    "{name} {version} is also declared under {} with a different \
                                     product directory; using {}",
                                    db.stack_root,
                                    first.stack_root.as_deref().map(|p| p.as_str()).unwrap_or("?")
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    best_err = Some(pick_more_specific(best_err.take(), e));
                }
            }
        }
        found.ok_or_else(|| best_err.unwrap_or_else(|| Error::no_such_product(name)))
    }

    /// Enumerate every declared version matching a relational expression
    /// (and any sibling constraints) and pick the highest; ties go to the
    /// earlier stack, then the lexicographically lower version.
    fn select_by_expression(
        &mut self,
        name: &str,
        expr: &str,
        constraints: &[String],
    ) -> Result<Product> {
        struct Candidate {
            version: String,
            stack_index: usize,
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut declared_anywhere = false;
        for (stack_index, db) in self.databases.iter().enumerate() {
            for version in db.versions_of(name) {
                declared_anywhere = true;
                if version_match(&version, expr)?
                    && matches_all(&version, constraints)?
                    && find_with_fallbacks(db, name, &version, &self.flavor).is_ok()
                {
                    candidates.push(Candidate {
                        version,
                        stack_index,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            version::compare(&b.version, &a.version)
                .then(a.stack_index.cmp(&b.stack_index))
                .then(a.version.cmp(&b.version))
        });

        let Some(winner) = candidates.first() else {
            return if declared_anywhere {
                Err(Error::NoMatchingVersion {
                    product: name.to_string(),
                    expr: describe_constraints(expr, constraints),
                })
            } else {
                Err(Error::no_such_product(name))
            };
        };

        self.selection_exprs
            .insert(name.to_string(), describe_constraints(expr, constraints));
        find_with_fallbacks(
            &self.databases[winner.stack_index],
            name,
            &winner.version,
            &self.flavor,
        )
    }
}

/// Does a version satisfy every expression in the list?
fn matches_all(version: &str, constraints: &[String]) -> Result<bool> {
    for expr in constraints {
        if !version_match(version, expr)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The constraint set as shown in diagnostics.
fn describe_constraints(expr: &str, constraints: &[String]) -> String {
    let mut parts = vec![expr.to_string()];
    for c in constraints {
        if c != expr && !parts.contains(c) {
            parts.push(c.clone());
        }
    }
    parts.join(" && ")
}

/// One request's version demand, as shown in diagnostics.
fn describe_request(request: &SetupRequest) -> String {
    match (&request.version, &request.version_expr) {
        (Some(v), Some(e)) => format!("{v} [{e}]"),
        (Some(v), None) => v.clone(),
        (None, Some(e)) => e.clone(),
        (None, None) => String::new(),
    }
}

/// Recursion ceiling, mirroring the resolver's frame-stack bound.
const MAX_DEPTH: usize = 100;

/// Look a version up in one database, trying the flavor fallback chain.
fn find_with_fallbacks(db: &Database, name: &str, version: &str, flavor: &str) -> Result<Product> {
    let mut last = None;
    for try_flavor in flavor::fallback_flavors(flavor) {
        match db.find_version(name, version, &try_flavor) {
            Ok(product) => return Ok(product),
            Err(e) => last = Some(e),
        }
    }
    Err(last.unwrap_or_else(|| Error::no_such_product(name)))
}

/// Keep the lookup error that tells the user the most.
fn pick_more_specific(old: Option<Error>, new: Error) -> Error {
    fn rank(e: &Error) -> u8 {
        match e {
            Error::NoMatchingFlavor { .. } => 3,
            Error::NoSuchVersion { .. } => 2,
            Error::NoSuchProduct { .. } => 1,
            _ => 4,
        }
    }
    match old {
        Some(old) if rank(&old) >= rank(&new) => old,
        _ => new,
    }
}

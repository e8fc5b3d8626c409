//! Filter Registry
//!
//! Routes inbound messages to callbacks. Filters live in scopes keyed by
//! `(caller, route)`; within a scope they keep registration order.
//!
//! ## Matching
//!
//! 1. Split the scope into fall-through filters (no predicates) and
//!    predicate filters.
//! 2. A predicate filter matches when every one of its predicates matches
//!    (see [`predicate::matches_all`]).
//! 3. Callbacks of all matching predicate filters are returned in
//!    registration order, list-valued callbacks flattened.
//! 4. Only when no predicate filter matched are the fall-through callbacks
//!    returned instead.
//!
//! Bad registrations are reported to the caller and logged; they leave the
//! scope untouched so dispatch for the remaining filters keeps working.

pub mod handler;
pub mod predicate;

pub use handler::{handler_fn, Callback, FnHandler, MessageHandler};
pub use predicate::{matches_all, Field, FieldPredicate};

use crate::error::{MailmanError, Result};
use crate::message::{ActorId, Message};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Key of one filter list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterScope {
    pub caller: ActorId,
    pub route: String,
}

impl FilterScope {
    pub fn new(caller: impl Into<ActorId>, route: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            route: route.into(),
        }
    }
}

impl fmt::Display for FilterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.caller, self.route)
    }
}

/// A registered filter
#[derive(Clone)]
pub struct Filter {
    id: String,
    description: Option<String>,
    predicates: Vec<FieldPredicate>,
    callbacks: Vec<Callback>,
}

impl Filter {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn predicates(&self) -> &[FieldPredicate] {
        &self.predicates
    }

    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    /// No field predicates; only fires when nothing else in scope matches
    pub fn is_fall_through(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, message: &Message) -> bool {
        !self.is_fall_through() && matches_all(&self.predicates, message)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks: Vec<&str> = self.callbacks.iter().map(|c| c.name()).collect();
        f.debug_struct("Filter")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("predicates", &self.predicates)
            .field("callbacks", &callbacks)
            .finish()
    }
}

/// Registration request for [`FilterRegistry::add_filter`]
#[derive(Default)]
pub struct FilterSpec {
    caller: Option<ActorId>,
    route: Option<String>,
    predicates: Vec<(Field, String)>,
    callbacks: Vec<Callback>,
    description: Option<String>,
    id: Option<String>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope owner; defaults to the registry's actor
    pub fn caller(mut self, caller: impl Into<ActorId>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Scope route; defaults to the registry's default route
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn predicate(mut self, field: Field, pattern: impl Into<String>) -> Self {
        self.predicates.push((field, pattern.into()));
        self
    }

    pub fn sender(self, pattern: impl Into<String>) -> Self {
        self.predicate(Field::Sender, pattern)
    }

    pub fn recipient(self, pattern: impl Into<String>) -> Self {
        self.predicate(Field::Recipient, pattern)
    }

    pub fn subject(self, pattern: impl Into<String>) -> Self {
        self.predicate(Field::Subject, pattern)
    }

    pub fn body(self, pattern: impl Into<String>) -> Self {
        self.predicate(Field::Body, pattern)
    }

    pub fn time(self, pattern: impl Into<String>) -> Self {
        self.predicate(Field::Time, pattern)
    }

    pub fn header(self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.predicate(Field::Header(name.into()), pattern)
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn callbacks(mut self, callbacks: impl IntoIterator<Item = Callback>) -> Self {
        self.callbacks.extend(callbacks);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Explicit id; generated when absent
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Result of matching one message against a scope
#[derive(Default)]
pub struct FilterMatch {
    /// Ids of the filters whose callbacks were selected
    pub filter_ids: Vec<String>,
    pub callbacks: Vec<Callback>,
    /// Selected callbacks came from fall-through filters
    pub fall_through: bool,
}

impl FilterMatch {
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// Filters of one actor, by scope
pub struct FilterRegistry {
    owner: ActorId,
    default_route: String,
    scopes: RwLock<HashMap<FilterScope, Vec<Filter>>>,
}

impl FilterRegistry {
    pub fn new(owner: impl Into<ActorId>, default_route: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            default_route: default_route.into(),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    pub fn default_route(&self) -> &str {
        &self.default_route
    }

    /// Register a filter
    ///
    /// Fails without touching the registry when `spec` has no callback,
    /// its scope cannot be resolved, a pattern does not compile, or its id
    /// is already taken in the scope.
    pub fn add_filter(&self, spec: FilterSpec) -> Result<Filter> {
        let requested_id = spec.id.clone();
        let result = self.insert(spec);

        match &result {
            Ok(filter) => info!(
                actor = %self.owner,
                filter_id = %filter.id,
                predicates = filter.predicates.len(),
                callbacks = filter.callbacks.len(),
                fall_through = filter.is_fall_through(),
                "Filter added"
            ),
            Err(e) => warn!(
                actor = %self.owner,
                filter_id = ?requested_id,
                error = %e,
                "Filter rejected"
            ),
        }

        result
    }

    fn insert(&self, spec: FilterSpec) -> Result<Filter> {
        if spec.callbacks.is_empty() {
            return Err(MailmanError::MissingCallback);
        }

        let scope = self.resolve_scope(
            spec.caller.as_ref().map(ActorId::as_str),
            spec.route.as_deref(),
        )?;

        let predicates = spec
            .predicates
            .into_iter()
            .map(|(field, pattern)| FieldPredicate::new(field, pattern))
            .collect::<Result<Vec<_>>>()?;

        let filter = Filter {
            id: spec
                .id
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            description: spec.description,
            predicates,
            callbacks: spec.callbacks,
        };

        let mut scopes = self.scopes.write();
        let filters = scopes.entry(scope.clone()).or_default();
        if filters.iter().any(|existing| existing.id == filter.id) {
            return Err(MailmanError::DuplicateFilterId {
                id: filter.id,
                scope: scope.to_string(),
            });
        }
        filters.push(filter.clone());

        Ok(filter)
    }

    /// Remove filters by id; returns how many were removed
    pub fn remove_filters_by_id(
        &self,
        caller: Option<&str>,
        route: Option<&str>,
        ids: &[&str],
    ) -> usize {
        let scope = match self.resolve_scope(caller, route) {
            Ok(scope) => scope,
            Err(e) => {
                warn!(actor = %self.owner, error = %e, "Filter removal skipped");
                return 0;
            }
        };

        let mut scopes = self.scopes.write();
        let Some(filters) = scopes.get_mut(&scope) else {
            return 0;
        };

        let before = filters.len();
        filters.retain(|filter| !ids.contains(&filter.id.as_str()));
        let removed = before - filters.len();

        if filters.is_empty() {
            scopes.remove(&scope);
        }

        if removed > 0 {
            info!(actor = %self.owner, scope = %scope, removed, "Filters removed");
        }
        removed
    }

    /// Callbacks for `message` in the given scope, in invocation order
    pub fn match_filter(
        &self,
        caller: Option<&str>,
        route: Option<&str>,
        message: &Message,
    ) -> Vec<Callback> {
        self.matching(caller, route, message).callbacks
    }

    /// Like [`FilterRegistry::match_filter`], also reporting which filters fired
    pub fn matching(
        &self,
        caller: Option<&str>,
        route: Option<&str>,
        message: &Message,
    ) -> FilterMatch {
        let scope = match self.resolve_scope(caller, route) {
            Ok(scope) => scope,
            Err(e) => {
                warn!(actor = %self.owner, error = %e, "Filter match skipped");
                return FilterMatch::default();
            }
        };

        let scopes = self.scopes.read();
        let Some(filters) = scopes.get(&scope) else {
            return FilterMatch::default();
        };

        let (fall_through, predicated): (Vec<&Filter>, Vec<&Filter>) =
            filters.iter().partition(|filter| filter.is_fall_through());

        let mut matched = FilterMatch::default();
        for filter in predicated.into_iter().filter(|f| f.matches(message)) {
            matched.filter_ids.push(filter.id.clone());
            matched.callbacks.extend(filter.callbacks.iter().cloned());
        }

        if matched.is_empty() {
            for filter in fall_through {
                matched.filter_ids.push(filter.id.clone());
                matched.callbacks.extend(filter.callbacks.iter().cloned());
            }
            matched.fall_through = !matched.is_empty();
        }

        debug!(
            actor = %self.owner,
            scope = %scope,
            messageid = %message.messageid,
            filters = ?matched.filter_ids,
            fall_through = matched.fall_through,
            "Matched filters"
        );

        matched
    }

    /// Snapshot of registered filters; `None` selects every caller or route
    pub fn list_filters(
        &self,
        caller: Option<&str>,
        route: Option<&str>,
    ) -> BTreeMap<FilterScope, Vec<Filter>> {
        self.scopes
            .read()
            .iter()
            .filter(|(scope, _)| caller.map_or(true, |c| scope.caller.as_str() == c))
            .filter(|(scope, _)| route.map_or(true, |r| scope.route == r))
            .map(|(scope, filters)| (scope.clone(), filters.clone()))
            .collect()
    }

    /// Total number of filters across all scopes
    pub fn len(&self) -> usize {
        self.scopes.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve_scope(&self, caller: Option<&str>, route: Option<&str>) -> Result<FilterScope> {
        let caller = caller.unwrap_or(self.owner.as_str());
        if caller.is_empty() {
            return Err(MailmanError::UnresolvedScope { field: "caller" });
        }

        let route = route.unwrap_or(self.default_route.as_str());
        if route.is_empty() {
            return Err(MailmanError::UnresolvedScope { field: "route" });
        }

        Ok(FilterScope::new(caller, route))
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("owner", &self.owner)
            .field("default_route", &self.default_route)
            .field("filters", &self.len())
            .finish()
    }
}

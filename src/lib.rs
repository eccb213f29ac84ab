//! Hierarchical role/resource access control with rule assertions and compound identifiers.
//!
//! An access control list (ACL) answers one question: may this *role* exercise this
//! *privilege* on this *resource*? In the sense of this implementation:
//!
//! * a *resource* is an object to which access is controlled.
//! * a *role* is an object that may request access to a resource.
//! * a *privilege* is an action which may be granted on a resource to a role.
//!
//! Resources form a tree: a resource may declare a single parent, and a query on a
//! resource that has no rule of its own ascends through its ancestors until one is
//! found. Roles form a directed acyclic graph: a role may inherit from any number of
//! parent roles, and rule search walks that graph depth first.
//!
//! # Denied by default
//!
//! A fresh [`Acl`] carries a single built-in rule denying everything to everyone. Until
//! an allow rule is defined, every query comes back `false`. The built-in rule can be
//! shadowed and overwritten, but never deleted; withdrawing it merely resets it.
//!
//! ```rust
//! # use permitree::Acl;
//! # fn main() -> Result<(), permitree::Error> {
//! let acl = Acl::new();
//! assert!(!acl.is_allowed(None::<&str>, None::<&str>, None)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Registering roles
//!
//! Roles are registered by name along with the names of their parents. Parents may be
//! registered later; the hierarchy is only checked when the next query runs, so
//! declaration order during bootstrap does not matter. A broken parent reference
//! surfaces as [`Error::MissingRole`] on the first query after it was introduced.
//!
//! ```rust
//! # use permitree::Acl;
//! # fn main() -> Result<(), permitree::Error> {
//! let mut acl = Acl::new();
//! acl.add_role("visitor", vec![])?;
//! acl.add_role("contributor", vec!["visitor"])?;
//! acl.add_role("maintainer", vec!["contributor"])?;
//! acl.add_role("owner", vec![])?;
//!
//! assert!(acl.role_inherits_from("maintainer", "visitor", false)?);
//! assert!(!acl.role_inherits_from("visitor", "maintainer", false)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Multiple inheritance and LIFO order
//!
//! When a role lists several parents, the last parent listed is the first one searched
//! for applicable rules. The search completes at the first rule that applies, so the
//! most recently listed parent wins a conflict:
//!
//! ```rust
//! # use permitree::Acl;
//! # fn main() -> Result<(), permitree::Error> {
//! let mut acl = Acl::new();
//! acl.add_role("guest", vec![])?;
//! acl.add_role("member", vec![])?;
//! acl.add_role("sally", vec!["guest", "member"])?;
//! acl.add_resource("forum", None)?;
//!
//! acl.deny(Some(vec!["guest"]), Some(vec!["forum"]), None, None)?;
//! acl.allow(Some(vec!["member"]), Some(vec!["forum"]), None, None)?;
//!
//! // "member" was listed after "guest", so it is searched first and its allow wins
//! assert!(acl.is_allowed(Some("sally"), Some("forum"), None)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Defining rules
//!
//! [`Acl::allow`] and [`Acl::deny`] take lists of roles, resources and privileges,
//! `None` standing for the wildcard "all". Rules need only be assigned from the general
//! to the specific, because roles and resources inherit the rules defined upon their
//! ancestors, and a specific privilege rule always beats an all-privileges rule on the
//! same (resource, role) pair.
//!
//! ```rust
//! # use permitree::Acl;
//! # fn main() -> Result<(), permitree::Error> {
//! let mut acl = Acl::new();
//! acl.add_role("visitor", vec![])?;
//! acl.add_role("maintainer", vec!["visitor"])?;
//! acl.add_resource("project", None)?;
//! acl.add_resource("issues", Some("project"))?;
//!
//! acl.allow(Some(vec!["visitor"]), Some(vec!["project"]), Some(vec!["view"]), None)?;
//! acl.allow(Some(vec!["maintainer"]), Some(vec!["issues"]), Some(vec!["triage"]), None)?;
//!
//! // inherited along both hierarchies
//! assert!(acl.is_allowed(Some("maintainer"), Some("issues"), Some("view"))?);
//! assert!(!acl.is_allowed(Some("visitor"), Some("issues"), Some("triage"))?);
//! # Ok(())
//! # }
//! ```
//!
//! Rules may reference roles and resources that are never registered. Hierarchy
//! membership is what requires registration, not rule storage or queries.
//!
//! # Assertions
//!
//! A rule may carry an [`Assertion`], a predicate consulted at query time; the rule
//! only applies while the assertion holds. The engine passes itself to the assertion so
//! that it can inspect the in-flight query through [`Acl::queried_role`] and
//! [`Acl::queried_resource`].
//!
//! ```rust
//! # use permitree::{Acl, Assertion};
//! # use std::rc::Rc;
//! # fn main() -> Result<(), permitree::Error> {
//! let mut acl = Acl::new();
//! acl.add_role("bot", vec![])?;
//! acl.add_resource("api", None)?;
//!
//! let off_peak: Assertion = Rc::new(|_acl, _role, _resource, _privilege| false);
//! acl.allow(Some(vec!["bot"]), Some(vec!["api"]), Some(vec!["crawl"]), Some(off_peak))?;
//!
//! // the assertion does not hold, so the rule is skipped and the default deny applies
//! assert!(!acl.is_allowed(Some("bot"), Some("api"), Some("crawl"))?);
//! # Ok(())
//! # }
//! ```
//!
//! # Compound identifiers
//!
//! A name containing an unescaped colon, such as `"ticket:451"`, is *compound*: it is
//! never registered itself, but behaves as a direct child of the name before the colon.
//! One set of rules on the base name therefore covers an unbounded family of per-record
//! identifiers, and an assertion can recover the record id from the queried name.
//!
//! ```rust
//! # use permitree::Acl;
//! # fn main() -> Result<(), permitree::Error> {
//! let mut acl = Acl::new();
//! acl.add_role("reporter", vec![])?;
//! acl.add_resource("ticket", None)?;
//! acl.allow(Some(vec!["reporter"]), Some(vec!["ticket"]), Some(vec!["read"]), None)?;
//!
//! assert!(acl.is_allowed(Some("reporter"), Some("ticket:451"), Some("read"))?);
//! # Ok(())
//! # }
//! ```
//!
//! # Querying
//!
//! [`Acl::is_allowed`] accepts plain string identifiers or any value implementing the
//! [`Role`] / [`Resource`] collaborator traits. [`Acl::is_allowed_any`] checks an
//! ordered fallback list of resources, and [`Acl::roles_allowed_for`] runs the inverse
//! query: which roles hold a direct allow on a resource. The inverse query deliberately
//! does not walk role inheritance; see its documentation.

use log::{trace, warn};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;


// Helper types ///////////////////////////////////////////////////////////////////////////////////


/// Allow or deny access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Allow,
    Deny,
} // enum Access

impl Access {

    fn flipped(self) -> Self {
        match self {
            Access::Allow => Access::Deny,
            Access::Deny => Access::Allow,
        } // match
    } // flipped

} // impl Access

/// A predicate attached to a rule. The rule only applies while the assertion holds at
/// query time. Receives the engine plus the (role, resource, privilege) position the
/// rule search is currently at, each `None` for the wildcard; the originally queried
/// identifiers are available through [`Acl::queried_role`] and [`Acl::queried_resource`].
pub type Assertion = Rc<dyn Fn(&Acl, Option<&str>, Option<&str>, Option<&str>) -> bool>;

/// Anything that can stand in for a role at the query boundary. Implemented for plain
/// strings, so identifiers and domain objects are interchangeable.
pub trait Role {
    /// The stable identifier of this role.
    fn role_id(&self) -> &str;
} // trait Role

impl Role for str {
    fn role_id(&self) -> &str { self }
} // impl Role for str

impl Role for String {
    fn role_id(&self) -> &str { self }
} // impl Role for String

/// Anything that can stand in for a resource at the query boundary.
pub trait Resource {
    /// The stable identifier of this resource.
    fn resource_id(&self) -> &str;
} // trait Resource

impl Resource for str {
    fn resource_id(&self) -> &str { self }
} // impl Resource for str

impl Resource for String {
    fn resource_id(&self) -> &str { self }
} // impl Resource for String

/// One axis of a rule key: either a concrete identifier or the wildcard covering all of
/// them. Keeps the wildcard out of the identifier namespace.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Selector {
    All,
    Id(String),
} // enum Selector

impl From<Option<&str>> for Selector {

    fn from(id: Option<&str>) -> Self {
        match id {
            None => Selector::All,
            Some(id) => Selector::Id(id.to_string()),
        } // match
    } // from

} // impl From for Selector

/// A stored access decision, optionally gated by an assertion.
#[derive(Clone)]
struct Rule {
    access: Access,
    assert: Option<Assertion>,
} // struct Rule

impl Rule {

    /// The built-in rule at the fully wildcarded key. Never removed, only reset.
    fn default_deny() -> Self {
        Rule { access: Access::Deny, assert: None }
    } // default_deny

} // impl Rule

impl fmt::Debug for Rule {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Rule")
            .field("access", &self.access)
            .field("assert", &self.assert.is_some())
            .finish()
    } // fmt

} // impl fmt::Debug for Rule

/// The rules recorded for one (resource, role) pair: one slot covering all privileges
/// plus one slot per named privilege. A specific slot always wins over the all slot.
#[derive(Clone, Debug, Default)]
struct RuleBucket {
    all_privileges: Option<Rule>,
    by_privilege: BTreeMap<String, Rule>,
} // struct RuleBucket

/// Whether `set_rule` writes or withdraws.
#[derive(Clone, Copy, Debug)]
enum RuleOp {
    Add,
    Remove,
} // enum RuleOp

/// Reverse parent/child links, rebuilt by the lazy validation pass.
#[derive(Debug, Default)]
struct Links {
    role_children: BTreeMap<String, Vec<String>>,
    resource_children: BTreeMap<String, Vec<String>>,
} // struct Links

/// The query currently in flight, exposed to assertions.
#[derive(Debug, Default)]
struct Cursor {
    role: Option<String>,
    resource: Option<String>,
} // struct Cursor


// Compound names /////////////////////////////////////////////////////////////////////////////////


/// Splits a compound name at its first unescaped colon into (base, parameters). A colon
/// preceded by a backslash does not count, and neither does a colon in the first
/// position. Returns None for plain names.
fn split_compound(name: &str) -> Option<(&str, &str)> {
    let bytes = name.as_bytes();

    for i in 1..bytes.len() {
        if bytes[i] == b':' && bytes[i - 1] != b'\\' {
            return Some((&name[..i], &name[i + 1..]));
        } // if
    } // for
    None
} // split_compound

fn normalize_selectors(list: Option<Vec<&str>>, what: &'static str) -> Result<Vec<Selector>, Error> {
    match list {
        None => Ok(vec![Selector::All]),
        Some(list) => {
            if list.is_empty() {
                warn!("empty {} list passed to rule definition", what);
                return Err(Error::EmptySelection(what));
            } // if
            if list.iter().any(|name| name.is_empty()) {
                warn!("empty {} name passed to rule definition", what);
                return Err(Error::EmptyName);
            } // if
            Ok(list.into_iter().map(|name| Selector::Id(name.to_string())).collect())
        } // Some
    } // match
} // normalize_selectors


// Acl ////////////////////////////////////////////////////////////////////////////////////////////


/// Main structure holding the registered roles, resources and the rule table. Rules may
/// reference identifiers that were never registered; only hierarchy membership requires
/// registration, and that is checked lazily before the first query after a change. A
/// catch-all rule is predefined and denies access, like a drop policy on firewalls.
pub struct Acl {
    roles: BTreeMap<String, Vec<String>>,
    resources: BTreeMap<String, Option<String>>,
    rules: BTreeMap<Selector, BTreeMap<Selector, RuleBucket>>,
    links: RefCell<Links>,
    dirty: Cell<bool>,
    queried: RefCell<Cursor>,
} // struct Acl

impl Acl {

    /// Creates a new `Acl` holding only the built-in catch-all deny rule.
    pub fn new() -> Self {
        trace!("creating new acl");
        let mut acl = Acl {
            roles: BTreeMap::new(),
            resources: BTreeMap::new(),
            rules: BTreeMap::new(),
            links: RefCell::new(Links::default()),
            dirty: Cell::new(false),
            queried: RefCell::new(Cursor::default()),
        }; // Acl

        acl.rules
            .entry(Selector::All)
            .or_default()
            .entry(Selector::All)
            .or_default()
            .all_privileges = Some(Rule::default_deny());
        acl
    } // new

    // Registry ///////////////////////////////////////////////////////////////////////////////////

    /// Adds a new role with its parents in order of precedence: the last parent listed
    /// is the first one searched during queries. Parents need not be registered yet;
    /// dangling references surface on the next query. Returns an error on an empty name
    /// or a duplicate registration.
    pub fn add_role(&mut self, name: &str, parents: Vec<&str>) -> Result<&mut Self, Error> {
        trace!("adding role {} with parents {:?}", name, parents);
        if name.is_empty() || parents.iter().any(|parent| parent.is_empty()) {
            warn!("adding role with an empty name");
            return Err(Error::EmptyName);
        } // if
        if self.roles.contains_key(name) {
            warn!("adding duplicate role: {}", name);
            return Err(Error::DuplicateRole(name.to_string()));
        } // if
        self.roles.insert(
            name.to_string(),
            parents.into_iter().map(String::from).collect(),
        );
        self.dirty.set(true);
        Ok(self)
    } // add_role

    /// Adds a new resource with an optional parent. The parent need not be registered
    /// yet. Returns an error on an empty name or a duplicate registration.
    pub fn add_resource(&mut self, name: &str, parent: Option<&str>) -> Result<&mut Self, Error> {
        trace!("adding resource {} with parent {:?}", name, parent);
        if name.is_empty() || parent.map_or(false, str::is_empty) {
            warn!("adding resource with an empty name");
            return Err(Error::EmptyName);
        } // if
        if self.resources.contains_key(name) {
            warn!("adding duplicate resource: {}", name);
            return Err(Error::DuplicateResource(name.to_string()));
        } // if
        self.resources.insert(name.to_string(), parent.map(String::from));
        self.dirty.set(true);
        Ok(self)
    } // add_resource

    /// Role removal is not part of the supported surface.
    pub fn remove_role(&mut self, name: &str) -> Result<&mut Self, Error> {
        warn!("refusing to remove role {}", name);
        Err(Error::NotSupported("removing roles"))
    } // remove_role

    /// Resource removal is not part of the supported surface.
    pub fn remove_resource(&mut self, name: &str) -> Result<&mut Self, Error> {
        warn!("refusing to remove resource {}", name);
        Err(Error::NotSupported("removing resources"))
    } // remove_resource

    /// Returns true if the name resolves to a registered role, either directly or as a
    /// compound name whose base is registered. Runs the lazy validation pass first.
    pub fn has_role(&self, name: &str) -> Result<bool, Error> {
        self.validate()?;
        Ok(self.resolves_role(name))
    } // has_role

    /// Returns true if the name resolves to a registered resource, either directly or
    /// as a compound name whose base is registered. Runs the lazy validation pass
    /// first.
    pub fn has_resource(&self, name: &str) -> Result<bool, Error> {
        self.validate()?;
        Ok(self.resolves_resource(name))
    } // has_resource

    /// Returns all registered role names.
    pub fn get_roles(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    } // get_roles

    /// Returns all registered resource names.
    pub fn get_resources(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    } // get_resources

    /// Returns the parents of a role in the order they were listed. A compound name
    /// reports its base as its single parent. Returns an error if the name does not
    /// resolve.
    pub fn get_role_parents(&self, name: &str) -> Result<Vec<String>, Error> {
        trace!("getting role parents for: {}", name);
        if let Some(parents) = self.roles.get(name) {
            return Ok(parents.clone());
        } // if
        if let Some((base, _)) = split_compound(name) {
            if self.roles.contains_key(base) {
                return Ok(vec![base.to_string()]);
            } // if
        } // if
        warn!("missing role while getting parents: {}", name);
        Err(Error::MissingRole(name.to_string()))
    } // get_role_parents

    /// Returns the parent of a resource, or None at the root. A compound name reports
    /// its base as its parent. Returns an error if the name does not resolve.
    pub fn get_resource_parent(&self, name: &str) -> Result<Option<String>, Error> {
        trace!("getting resource parent for: {}", name);
        if let Some(parent) = self.resources.get(name) {
            return Ok(parent.clone());
        } // if
        if let Some((base, _)) = split_compound(name) {
            if self.resources.contains_key(base) {
                return Ok(Some(base.to_string()));
            } // if
        } // if
        warn!("missing resource while getting parent: {}", name);
        Err(Error::MissingResource(name.to_string()))
    } // get_resource_parent

    /// Returns the registered roles listing this role as a parent. Runs the lazy
    /// validation pass first.
    pub fn role_children(&self, name: &str) -> Result<Vec<String>, Error> {
        self.validate()?;
        if !self.roles.contains_key(name) {
            warn!("missing role while getting children: {}", name);
            return Err(Error::MissingRole(name.to_string()));
        } // if
        Ok(self
            .links
            .borrow()
            .role_children
            .get(name)
            .cloned()
            .unwrap_or_default())
    } // role_children

    /// Returns the registered resources listing this resource as their parent. Runs the
    /// lazy validation pass first.
    pub fn resource_children(&self, name: &str) -> Result<Vec<String>, Error> {
        self.validate()?;
        if !self.resources.contains_key(name) {
            warn!("missing resource while getting children: {}", name);
            return Err(Error::MissingResource(name.to_string()));
        } // if
        Ok(self
            .links
            .borrow()
            .resource_children
            .get(name)
            .cloned()
            .unwrap_or_default())
    } // resource_children

    /// Returns true if `role` has `ancestor` anywhere in its parent graph, or as a
    /// direct parent when `only_direct` is set. Compound names inherit from their base.
    pub fn role_inherits_from(
        &self,
        role: &(impl Role + ?Sized),
        ancestor: &(impl Role + ?Sized),
        only_direct: bool,
    ) -> Result<bool, Error> {
        let role = role.role_id();
        let ancestor = ancestor.role_id();

        trace!("checking whether role {} inherits from {}", role, ancestor);
        self.validate()?;
        if !self.resolves_role(role) {
            return Err(Error::MissingRole(role.to_string()));
        } // if
        if !self.resolves_role(ancestor) {
            return Err(Error::MissingRole(ancestor.to_string()));
        } // if

        let mut stack = self.role_parents_for_search(role);

        if only_direct {
            return Ok(stack.iter().any(|parent| parent == ancestor));
        } // if

        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            } // if
            if current == ancestor {
                return Ok(true);
            } // if
            stack.extend(self.role_parents_for_search(&current));
        } // while
        Ok(false)
    } // role_inherits_from

    /// Returns true if `resource` has `ancestor` anywhere in its parent chain, or as
    /// its direct parent when `only_direct` is set. Compound names inherit from their
    /// base.
    pub fn resource_inherits_from(
        &self,
        resource: &(impl Resource + ?Sized),
        ancestor: &(impl Resource + ?Sized),
        only_direct: bool,
    ) -> Result<bool, Error> {
        let resource = resource.resource_id();
        let ancestor = ancestor.resource_id();

        trace!("checking whether resource {} inherits from {}", resource, ancestor);
        self.validate()?;
        if !self.resolves_resource(resource) {
            return Err(Error::MissingResource(resource.to_string()));
        } // if
        if !self.resolves_resource(ancestor) {
            return Err(Error::MissingResource(ancestor.to_string()));
        } // if

        let mut current = self.parent_for_search(resource);

        if only_direct {
            return Ok(current.as_deref() == Some(ancestor));
        } // if

        let mut visited: HashSet<String> = HashSet::new();

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                break;
            } // if
            if name == ancestor {
                return Ok(true);
            } // if
            current = self.parent_for_search(&name);
        } // while
        Ok(false)
    } // resource_inherits_from

    /// Confirms every declared parent is registered and rebuilds the reverse child
    /// links. Runs before every query, but only after a registration changed the
    /// hierarchy; the dirty flag clears only after a fully successful pass.
    fn validate(&self) -> Result<(), Error> {
        if !self.dirty.get() {
            return Ok(());
        } // if
        trace!("validating role and resource hierarchies");

        let mut links = Links::default();

        for (name, parents) in &self.roles {
            for parent in parents {
                if !self.roles.contains_key(parent) {
                    warn!("role {} declares unregistered parent {}", name, parent);
                    return Err(Error::MissingRole(parent.clone()));
                } // if
                links
                    .role_children
                    .entry(parent.clone())
                    .or_default()
                    .push(name.clone());
            } // for
        } // for
        for (name, parent) in &self.resources {
            if let Some(parent) = parent {
                if !self.resources.contains_key(parent) {
                    warn!("resource {} declares unregistered parent {}", name, parent);
                    return Err(Error::MissingResource(parent.clone()));
                } // if
                links
                    .resource_children
                    .entry(parent.clone())
                    .or_default()
                    .push(name.clone());
            } // if
        } // for

        *self.links.borrow_mut() = links;
        self.dirty.set(false);
        Ok(())
    } // validate

    fn resolves_role(&self, name: &str) -> bool {
        self.roles.contains_key(name)
            || split_compound(name).map_or(false, |(base, _)| self.roles.contains_key(base))
    } // resolves_role

    fn resolves_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
            || split_compound(name).map_or(false, |(base, _)| self.resources.contains_key(base))
    } // resolves_resource

    /// The parents a query walks from this role: the registered parents, or the base of
    /// a compound name, or nothing.
    fn role_parents_for_search(&self, name: &str) -> Vec<String> {
        if let Some(parents) = self.roles.get(name) {
            parents.clone()
        } else if let Some((base, _)) = split_compound(name) {
            vec![base.to_string()]
        } else {
            Vec::new()
        } // else
    } // role_parents_for_search

    /// The next resource a query ascends to: the registered parent, or the base of a
    /// compound name. None means the wildcard level is next.
    fn parent_for_search(&self, name: &str) -> Option<String> {
        match self.resources.get(name) {
            Some(parent) => parent.clone(),
            None => split_compound(name).map(|(base, _)| base.to_string()),
        } // match
    } // parent_for_search

    // Rule table /////////////////////////////////////////////////////////////////////////////////

    /// Allows the privileges for the roles on the resources, `None` meaning all. The
    /// optional assertion gates the rule at query time. Later definitions for the same
    /// key silently overwrite earlier ones. Identifiers need not be registered.
    pub fn allow(
        &mut self,
        roles: Option<Vec<&str>>,
        resources: Option<Vec<&str>>,
        privileges: Option<Vec<&str>>,
        assert: Option<Assertion>,
    ) -> Result<&mut Self, Error> {
        trace!("allowing {:?} on {:?} to {:?}", privileges, resources, roles);
        self.set_rule(RuleOp::Add, Access::Allow, roles, resources, privileges, assert)
    } // allow

    /// Denies the privileges for the roles on the resources, `None` meaning all.
    pub fn deny(
        &mut self,
        roles: Option<Vec<&str>>,
        resources: Option<Vec<&str>>,
        privileges: Option<Vec<&str>>,
        assert: Option<Assertion>,
    ) -> Result<&mut Self, Error> {
        trace!("denying {:?} on {:?} to {:?}", privileges, resources, roles);
        self.set_rule(RuleOp::Add, Access::Deny, roles, resources, privileges, assert)
    } // deny

    /// Withdraws allow rules at the given keys. A key currently holding a deny rule is
    /// left untouched.
    pub fn remove_allow(
        &mut self,
        roles: Option<Vec<&str>>,
        resources: Option<Vec<&str>>,
        privileges: Option<Vec<&str>>,
    ) -> Result<&mut Self, Error> {
        trace!("removing allow of {:?} on {:?} for {:?}", privileges, resources, roles);
        self.set_rule(RuleOp::Remove, Access::Allow, roles, resources, privileges, None)
    } // remove_allow

    /// Withdraws deny rules at the given keys. A key currently holding an allow rule is
    /// left untouched. Withdrawing the fully wildcarded deny resets it to the built-in
    /// default instead of deleting it.
    pub fn remove_deny(
        &mut self,
        roles: Option<Vec<&str>>,
        resources: Option<Vec<&str>>,
        privileges: Option<Vec<&str>>,
    ) -> Result<&mut Self, Error> {
        trace!("removing deny of {:?} on {:?} for {:?}", privileges, resources, roles);
        self.set_rule(RuleOp::Remove, Access::Deny, roles, resources, privileges, None)
    } // remove_deny

    /// Writes or withdraws one rule per (resource, role) pair of the Cartesian product.
    fn set_rule(
        &mut self,
        op: RuleOp,
        access: Access,
        roles: Option<Vec<&str>>,
        resources: Option<Vec<&str>>,
        privileges: Option<Vec<&str>>,
        assert: Option<Assertion>,
    ) -> Result<&mut Self, Error> {
        let role_selectors = normalize_selectors(roles, "role")?;
        let resource_selectors = normalize_selectors(resources, "resource")?;
        let privileges: Vec<String> = match privileges {
            None => Vec::new(),
            Some(list) => {
                if list.is_empty() {
                    warn!("empty privilege list passed to rule definition");
                    return Err(Error::EmptySelection("privilege"));
                } // if
                if list.iter().any(|privilege| privilege.is_empty()) {
                    return Err(Error::EmptyName);
                } // if
                list.into_iter().map(String::from).collect()
            } // Some
        }; // match

        for resource in &resource_selectors {
            for role in &role_selectors {
                match op {
                    RuleOp::Add => {
                        let bucket = self
                            .rules
                            .entry(resource.clone())
                            .or_default()
                            .entry(role.clone())
                            .or_default();

                        if privileges.is_empty() {
                            bucket.all_privileges = Some(Rule { access, assert: assert.clone() });
                        } else {
                            for privilege in &privileges {
                                bucket
                                    .by_privilege
                                    .insert(privilege.clone(), Rule { access, assert: assert.clone() });
                            } // for
                        } // else
                    } // Add
                    RuleOp::Remove => {
                        // withdrawal never creates buckets
                        let bucket = match self
                            .rules
                            .get_mut(resource)
                            .and_then(|by_role| by_role.get_mut(role))
                        {
                            Some(bucket) => bucket,
                            None => continue,
                        }; // match

                        if privileges.is_empty() {
                            let recorded = match &bucket.all_privileges {
                                Some(rule) => rule.access,
                                None => continue,
                            }; // match

                            if recorded != access {
                                continue;
                            } // if
                            if *resource == Selector::All && *role == Selector::All {
                                // the catch-all rule must always exist
                                bucket.all_privileges = Some(Rule::default_deny());
                            } else {
                                bucket.all_privileges = None;
                            } // else
                        } else {
                            for privilege in &privileges {
                                let recorded = bucket
                                    .by_privilege
                                    .get(privilege)
                                    .map_or(false, |rule| rule.access == access);

                                if recorded {
                                    bucket.by_privilege.remove(privilege);
                                } // if
                            } // for
                        } // else
                    } // Remove
                } // match
            } // for
        } // for
        Ok(self)
    } // set_rule

    // Query engine ///////////////////////////////////////////////////////////////////////////////

    /// Returns true if the privilege is allowed for the role on the resource, `None`
    /// meaning all. Accepts plain string identifiers or [`Role`] / [`Resource`] values.
    /// Unregistered identifiers are valid query subjects; they simply own no hierarchy.
    pub fn is_allowed(
        &self,
        role: Option<&(impl Role + ?Sized)>,
        resource: Option<&(impl Resource + ?Sized)>,
        privilege: Option<&str>,
    ) -> Result<bool, Error> {
        let role = role.map(|role| role.role_id());

        match resource {
            Some(resource) => self.query(role, &[resource.resource_id()], privilege),
            None => self.query(role, &[], privilege),
        } // match
    } // is_allowed

    /// Like [`Acl::is_allowed`] with an ordered fallback list of resources: every entry
    /// is tried at each depth of the hierarchy before the search ascends further.
    pub fn is_allowed_any(
        &self,
        role: Option<&(impl Role + ?Sized)>,
        resources: &[&str],
        privilege: Option<&str>,
    ) -> Result<bool, Error> {
        self.query(role.map(|role| role.role_id()), resources, privilege)
    } // is_allowed_any

    /// Returns true if the privilege is denied for the role on the resource.
    pub fn is_denied(
        &self,
        role: Option<&(impl Role + ?Sized)>,
        resource: Option<&(impl Resource + ?Sized)>,
        privilege: Option<&str>,
    ) -> Result<bool, Error> {
        self.is_allowed(role, resource, privilege).map(|allowed| !allowed)
    } // is_denied

    /// The role of the query currently in flight, for assertions.
    pub fn queried_role(&self) -> Option<String> {
        self.queried.borrow().role.clone()
    } // queried_role

    /// The resource of the query currently in flight, for assertions. With a fallback
    /// list this is the first entry.
    pub fn queried_resource(&self) -> Option<String> {
        self.queried.borrow().resource.clone()
    } // queried_resource

    fn query(
        &self,
        role: Option<&str>,
        resources: &[&str],
        privilege: Option<&str>,
    ) -> Result<bool, Error> {
        trace!("querying access of {:?} on {:?} to {:?}", role, resources, privilege);
        self.validate()?;
        {
            let mut cursor = self.queried.borrow_mut();

            cursor.role = role.map(str::to_string);
            cursor.resource = resources.first().map(|name| name.to_string());
        }

        let result = self.search(role, resources, privilege);

        *self.queried.borrow_mut() = Cursor::default();
        Ok(result? == Access::Allow)
    } // query

    /// The resource levels a query visits, in order: the starting resources, then their
    /// parents breadth-wise, each level once, the wildcard level last. Compound names
    /// ascend to their base; unregistered plain names fall straight to the wildcard.
    fn resource_walk(&self, start: &[&str]) -> Vec<Option<String>> {
        let mut order = Vec::new();
        let mut seen: HashSet<Option<String>> = HashSet::new();
        let mut level: Vec<Option<String>> = if start.is_empty() {
            vec![None]
        } else {
            start.iter().map(|name| Some((*name).to_string())).collect()
        }; // else

        while !level.is_empty() {
            let mut next = Vec::new();

            for current in level {
                if !seen.insert(current.clone()) {
                    continue;
                } // if
                if let Some(name) = current.as_deref() {
                    next.push(self.parent_for_search(name));
                } // if
                order.push(current);
            } // for
            level = next;
        } // while
        order
    } // resource_walk

    fn search(
        &self,
        role: Option<&str>,
        start: &[&str],
        privilege: Option<&str>,
    ) -> Result<Access, Error> {
        for current in self.resource_walk(start) {
            let resource = current.as_deref();

            if let Some(role) = role {
                if let Some(access) = self.search_role_rules(role, resource, privilege) {
                    trace!("    resolved by role rule at {:?}: {:?}", resource, access);
                    return Ok(access);
                } // if
            } // if
            if let Some(access) = self.search_all_roles(resource, privilege) {
                trace!("    resolved by all-roles rule at {:?}: {:?}", resource, access);
                return Ok(access);
            } // if
        } // for
        warn!("query exhausted the resource chain, the catch-all rule has been lost");
        Err(Error::NoRuleApplies)
    } // search

    /// Depth-first search over the role graph at one resource level. Parents are pushed
    /// in registration order, so the last listed parent is popped and examined first.
    /// Compound roles descend from their base.
    fn search_role_rules(
        &self,
        role: &str,
        resource: Option<&str>,
        privilege: Option<&str>,
    ) -> Option<Access> {
        let mut stack = vec![role.to_string()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            } // if

            let found = match privilege {
                Some(_) => self
                    .rule_type(resource, Some(current.as_str()), privilege)
                    .or_else(|| self.rule_type(resource, Some(current.as_str()), None)),
                None => self.scan_all_privileges(resource, Some(current.as_str())),
            }; // match

            if found.is_some() {
                return found;
            } // if

            if let Some(parents) = self.roles.get(&current) {
                stack.extend(parents.iter().cloned());
            } else if let Some((base, _)) = split_compound(&current) {
                stack.push(base.to_string());
            } // else
        } // while
        None
    } // search_role_rules

    /// The all-roles check at one resource level, once the role graph yielded nothing.
    fn search_all_roles(&self, resource: Option<&str>, privilege: Option<&str>) -> Option<Access> {
        match privilege {
            Some(_) => self
                .rule_type(resource, None, privilege)
                .or_else(|| self.rule_type(resource, None, None)),
            None => self.scan_all_privileges(resource, None),
        } // match
    } // search_all_roles

    /// Resolves an all-privileges query against one bucket. A single specific deny
    /// defeats the claim before the all-privileges slot is consulted.
    fn scan_all_privileges(&self, resource: Option<&str>, role: Option<&str>) -> Option<Access> {
        let bucket = self.bucket(resource, role)?;

        for privilege in bucket.by_privilege.keys() {
            if let Some(Access::Deny) = self.rule_type(resource, role, Some(privilege)) {
                return Some(Access::Deny);
            } // if
        } // for
        self.rule_type(resource, role, None)
    } // scan_all_privileges

    fn bucket(&self, resource: Option<&str>, role: Option<&str>) -> Option<&RuleBucket> {
        self.rules.get(&Selector::from(resource))?.get(&Selector::from(role))
    } // bucket

    /// Resolves the rule recorded exactly at (resource, role, privilege), if any,
    /// evaluating its assertion. An unsatisfied assertion makes the rule a non-match,
    /// except on the fully wildcarded catch-all key, where it flips the recorded
    /// access. That corner is inherited behavior and is relied upon; keep it intact.
    fn rule_type(
        &self,
        resource: Option<&str>,
        role: Option<&str>,
        privilege: Option<&str>,
    ) -> Option<Access> {
        let bucket = self.bucket(resource, role)?;
        let rule = match privilege {
            Some(privilege) => bucket.by_privilege.get(privilege)?,
            None => bucket.all_privileges.as_ref()?,
        }; // match

        if let Some(assert) = rule.assert.as_deref() {
            if !assert(self, role, resource, privilege) {
                return if resource.is_some() || role.is_some() || privilege.is_some() {
                    None
                } else {
                    Some(rule.access.flipped())
                }; // else
            } // if
        } // if
        Some(rule.access)
    } // rule_type

    /// The inverse query: every role holding an effective allow for the privilege
    /// somewhere along the resource chain, `None` meaning all resources or the
    /// all-privileges slot. A role denied at a more specific level stays excluded at
    /// the more general ones.
    ///
    /// Only roles named directly in rules are reported; role inheritance is *not*
    /// expanded, so a child of an allowed role does not appear. This asymmetry with
    /// [`Acl::is_allowed`] is deliberate and long-standing.
    pub fn roles_allowed_for(
        &self,
        resources: Option<Vec<&str>>,
        privilege: Option<&str>,
    ) -> Result<Vec<String>, Error> {
        trace!("collecting roles allowed for {:?} on {:?}", privilege, resources);
        self.validate()?;

        let start = resources.unwrap_or_default();
        let mut allowed: Vec<String> = Vec::new();
        let mut denied: HashSet<String> = HashSet::new();

        for current in self.resource_walk(&start) {
            let by_role = match self.rules.get(&Selector::from(current.as_deref())) {
                Some(by_role) => by_role,
                None => continue,
            }; // match

            for (selector, bucket) in by_role {
                let role = match selector {
                    Selector::Id(role) => role,
                    Selector::All => continue,
                }; // match
                let rule = match privilege {
                    Some(privilege) => bucket
                        .by_privilege
                        .get(privilege)
                        .or_else(|| bucket.all_privileges.as_ref()),
                    None => bucket.all_privileges.as_ref(),
                }; // match
                let rule = match rule {
                    Some(rule) => rule,
                    None => continue,
                }; // match

                if let Some(assert) = rule.assert.as_deref() {
                    if !assert(self, Some(role), current.as_deref(), privilege) {
                        continue;
                    } // if
                } // if

                match rule.access {
                    Access::Deny => {
                        denied.insert(role.clone());
                    } // Deny
                    Access::Allow => {
                        if !denied.contains(role.as_str()) && !allowed.iter().any(|name| name == role) {
                            allowed.push(role.clone());
                        } // if
                    } // Allow
                } // match
            } // for
        } // for
        Ok(allowed)
    } // roles_allowed_for

} // impl Acl

impl fmt::Debug for Acl {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Acl")
            .field("roles", &self.roles)
            .field("resources", &self.resources)
            .field("rules", &self.rules)
            .finish()
    } // fmt

} // impl fmt::Debug for Acl


// Error //////////////////////////////////////////////////////////////////////////////////////////


/// Everything that can go wrong while building or querying an [`Acl`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("name must be a non-empty string")]
    EmptyName,
    #[error("at least one {0} must be given")]
    EmptySelection(&'static str),
    #[error("duplicate role: {0}")]
    DuplicateRole(String),
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),
    #[error("role '{0}' does not exist")]
    MissingRole(String),
    #[error("resource '{0}' does not exist")]
    MissingResource(String),
    #[error("no rule applies; the catch-all rule has been removed")]
    NoRuleApplies,
    #[error("{0} is not supported")]
    NotSupported(&'static str),
} // enum Error


// Tests //////////////////////////////////////////////////////////////////////////////////////////


// mod tests

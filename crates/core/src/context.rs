//! The evaluation context: global tables plus a stack of local frames.
//!
//! Lookups walk the frame stack from the innermost frame outwards and
//! finish at the global tables. The most local definition wins. Writes go
//! to the innermost table unless the caller asks for a namespace-wide
//! write.
//!
//! Frames and iteration bindings are managed through RAII guards
//! ([`FrameGuard`], [`IterationGuard`]) so they are released even when
//! evaluation bails out early with `?`.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value as Json;

use crate::class_expr;
use crate::class_table::{Class, ClassTable};
use crate::error::ContextError;
use crate::reference::{VarRef, DEFAULT_NAMESPACE, THIS_SCOPE};
use crate::value::{DataType, Value};
use crate::var_table::{VarTable, Variable};

/// Scope unqualified references resolve against outside any bundle.
pub const DEFAULT_SCOPE: &str = "main";

/// The bundle a frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub ns: String,
    pub name: String,
}

impl Bundle {
    pub fn new(ns: &str, name: &str) -> Self {
        Bundle {
            ns: ns.to_string(),
            name: name.to_string(),
        }
    }
}

/// Where a class definition lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    /// The global table of the class's namespace.
    Namespace,
    /// The innermost bundle frame.
    Bundle,
}

/// Scopes holding transient bindings outside the normal tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialScope {
    This,
}

impl SpecialScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialScope::This => THIS_SCOPE,
        }
    }
}

#[derive(Debug)]
struct Frame {
    bundle: Bundle,
    classes: ClassTable,
    variables: VarTable,
}

// ──────────────────────────────────────────────
// EvalContext
// ──────────────────────────────────────────────

/// State for one evaluation pass.
#[derive(Debug)]
pub struct EvalContext {
    classes: ClassTable,
    variables: VarTable,
    frames: Vec<Frame>,
    specials: VarTable,
    start_time: i64,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Self::with_start_time(now)
    }

    /// A context whose pass started at `start_time` (seconds since the epoch).
    pub fn with_start_time(start_time: i64) -> Self {
        EvalContext {
            classes: ClassTable::new(),
            variables: VarTable::new(),
            frames: Vec::new(),
            specials: VarTable::new(),
            start_time,
        }
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    // ── frames ───────────────────────────────

    pub fn current_bundle(&self) -> Option<&Bundle> {
        self.frames.last().map(|f| &f.bundle)
    }

    pub fn current_namespace(&self) -> &str {
        self.current_bundle()
            .map_or(DEFAULT_NAMESPACE, |b| b.ns.as_str())
    }

    pub fn current_scope(&self) -> &str {
        self.current_bundle().map_or(DEFAULT_SCOPE, |b| b.name.as_str())
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a local frame for `bundle`. The frame, and everything defined
    /// in it, is discarded when the guard drops.
    pub fn push_frame(&mut self, bundle: Bundle) -> FrameGuard<'_> {
        self.frames.push(Frame {
            bundle,
            classes: ClassTable::new(),
            variables: VarTable::new(),
        });
        FrameGuard { ctx: self }
    }

    /// Run `f` inside a fresh frame for `bundle`.
    pub fn with_frame<T, F>(&mut self, bundle: Bundle, f: F) -> T
    where
        F: FnOnce(&mut EvalContext) -> T,
    {
        let mut guard = self.push_frame(bundle);
        f(&mut guard)
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    // ── classes ──────────────────────────────

    /// Most local definition of a class.
    pub fn class_get(&self, ns: &str, name: &str) -> Option<&Class> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.classes.get(ns, name))
            .or_else(|| self.classes.get(ns, name))
    }

    pub fn class_is_defined(&self, ns: &str, name: &str) -> bool {
        self.class_get(ns, name).is_some()
    }

    pub fn class_activate(
        &mut self,
        ns: &str,
        name: &str,
        soft: bool,
        scope: ContextScope,
    ) -> Result<(), ContextError> {
        self.class_activate_tagged(ns, name, soft, scope, &[])
    }

    pub fn class_activate_tagged(
        &mut self,
        ns: &str,
        name: &str,
        soft: bool,
        scope: ContextScope,
        tags: &[&str],
    ) -> Result<(), ContextError> {
        let tags = tags.iter().copied();
        match scope {
            ContextScope::Namespace => self.classes.put(ns, name, soft, tags),
            ContextScope::Bundle => {
                if soft && self.classes.get(ns, name).is_some_and(Class::is_hard) {
                    return Err(ContextError::HardClassConflict {
                        class: name.to_string(),
                    });
                }
                let frame = self.frames.last_mut().ok_or_else(|| ContextError::NoActiveFrame {
                    class: name.to_string(),
                })?;
                frame.classes.put(ns, name, soft, tags)
            }
        }
    }

    /// Define a hard class in the default namespace.
    pub fn class_put_hard(&mut self, name: &str) -> Result<(), ContextError> {
        self.classes
            .put(DEFAULT_NAMESPACE, name, false, ["source=environment"])
    }

    /// Remove a soft class from every table that holds it.
    ///
    /// Returns whether anything was removed. Targeting a hard class is an
    /// error.
    pub fn class_deactivate(&mut self, ns: &str, name: &str) -> Result<bool, ContextError> {
        let is_hard = |t: &ClassTable| t.get(ns, name).is_some_and(Class::is_hard);
        if is_hard(&self.classes) || self.frames.iter().any(|f| is_hard(&f.classes)) {
            return Err(ContextError::HardClassNegation {
                class: name.to_string(),
            });
        }
        let mut removed = false;
        for frame in &mut self.frames {
            removed |= frame.classes.remove(ns, name);
        }
        removed |= self.classes.remove(ns, name);
        Ok(removed)
    }

    pub fn global_classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Classes defined in bundle frames, innermost frame first.
    pub fn local_classes(&self) -> impl Iterator<Item = &Class> {
        self.frames.iter().rev().flat_map(|f| f.classes.iter())
    }

    /// Evaluate a class expression. Unqualified names resolve in `ns`.
    pub fn is_defined_class(&self, expression: &str, ns: &str) -> bool {
        class_expr::is_defined(self, expression, ns)
    }

    // ── variables ────────────────────────────

    /// Resolve a reference against the current bundle.
    pub fn variable_get(&self, reference: &VarRef) -> Option<(Value, DataType)> {
        self.variable_get_in(reference, self.current_namespace(), self.current_scope())
    }

    /// Resolve a reference, filling missing parts from `ns` and `scope`.
    ///
    /// Indexing past the end of a stored container walks into the
    /// container: `cfg[servers][0]` finds element 0 of key `servers` of
    /// the container `cfg`.
    pub fn variable_get_in(
        &self,
        reference: &VarRef,
        ns: &str,
        scope: &str,
    ) -> Option<(Value, DataType)> {
        if let Some(key) = special_key(reference) {
            return self
                .specials
                .get(&key)
                .map(|v| (v.value.clone(), v.data_type));
        }

        let qualified = reference.qualify(ns, scope);
        if let Some(var) = self.lookup(&qualified) {
            return Some((var.value.clone(), var.data_type));
        }

        for depth in (0..qualified.indices.len()).rev() {
            let mut base = qualified.clone();
            let path = base.indices.split_off(depth);
            if let Some(var) = self.lookup(&base) {
                let Value::Container(json) = &var.value else {
                    return None;
                };
                return walk_container(json, &path);
            }
        }
        None
    }

    fn lookup(&self, qualified: &VarRef) -> Option<&Variable> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.variables.get(qualified))
            .or_else(|| self.variables.get(qualified))
    }

    /// Define a variable in the innermost table.
    pub fn variable_put(&mut self, reference: &VarRef, value: Value, data_type: DataType) {
        self.variable_define(reference, value, data_type, &[], ContextScope::Bundle);
    }

    /// Define a variable in the global table.
    pub fn variable_put_global(&mut self, reference: &VarRef, value: Value, data_type: DataType) {
        self.variable_define(reference, value, data_type, &[], ContextScope::Namespace);
    }

    /// Define a tagged variable. `Bundle` scope writes to the innermost
    /// frame, falling back to the global table outside any bundle.
    pub fn variable_define(
        &mut self,
        reference: &VarRef,
        value: Value,
        data_type: DataType,
        tags: &[&str],
        scope: ContextScope,
    ) {
        let value = value.normalized();
        let tags = tags.iter().copied();
        if let Some(key) = special_key(reference) {
            self.specials.put(key, value, data_type, tags);
            return;
        }

        let qualified = reference.qualify(self.current_namespace(), self.current_scope());
        let table = match (scope, self.frames.last_mut()) {
            (ContextScope::Bundle, Some(frame)) => &mut frame.variables,
            _ => &mut self.variables,
        };
        table.put(qualified, value, data_type, tags);
    }

    /// Remove the most local definition of a variable.
    pub fn variable_remove(&mut self, reference: &VarRef) -> bool {
        if let Some(key) = special_key(reference) {
            return self.specials.remove(&key);
        }
        let qualified = reference.qualify(self.current_namespace(), self.current_scope());
        for frame in self.frames.iter_mut().rev() {
            if frame.variables.remove(&qualified) {
                return true;
            }
        }
        self.variables.remove(&qualified)
    }

    /// Every visible variable, innermost definition first, shadowed
    /// definitions skipped.
    pub fn visible_variables(&self) -> Vec<&Variable> {
        let mut seen: HashSet<&VarRef> = HashSet::new();
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.variables.iter())
            .chain(self.variables.iter())
            .filter(|v| seen.insert(&v.reference))
            .collect()
    }

    /// Array entries below `reference`: visible variables with the same
    /// name and at least one more index, in definition order.
    pub fn array_entries(&self, reference: &VarRef) -> Vec<&Variable> {
        let qualified = reference.qualify(self.current_namespace(), self.current_scope());
        let entries: Vec<&Variable> = self
            .visible_variables()
            .into_iter()
            .filter(|v| {
                let r = &v.reference;
                r.ns == qualified.ns
                    && r.scope == qualified.scope
                    && r.lval == qualified.lval
                    && r.indices.len() > qualified.indices.len()
                    && r.indices.starts_with(&qualified.indices)
            })
            .collect();
        entries
    }

    // ── special scope ────────────────────────

    pub fn put_special(&mut self, scope: SpecialScope, lval: &str, value: Value) {
        let key = VarRef::new(None, Some(scope.as_str()), lval);
        let data_type = DataType::of(&value);
        self.specials.put(key, value.normalized(), data_type, Vec::<String>::new());
    }

    pub fn remove_special(&mut self, scope: SpecialScope, lval: &str) -> bool {
        self.specials
            .remove(&VarRef::new(None, Some(scope.as_str()), lval))
    }

    pub fn get_special(&self, scope: SpecialScope, lval: &str) -> Option<&Value> {
        self.specials
            .get(&VarRef::new(None, Some(scope.as_str()), lval))
            .map(|v| &v.value)
    }

    /// Start one iteration step. Bindings made through the guard are
    /// removed when it drops.
    pub fn iteration(&mut self) -> IterationGuard<'_> {
        IterationGuard {
            ctx: self,
            bound: Vec::new(),
        }
    }
}

/// The special-table key for references into `this`, including the bare
/// `this` used by `maplist`.
fn special_key(reference: &VarRef) -> Option<VarRef> {
    let is_special = match reference.scope.as_deref() {
        Some(scope) => scope == THIS_SCOPE,
        None => reference.ns.is_none() && reference.lval == THIS_SCOPE,
    };
    is_special.then(|| VarRef {
        ns: None,
        scope: Some(THIS_SCOPE.to_string()),
        lval: reference.lval.clone(),
        indices: reference.indices.clone(),
    })
}

fn walk_container(json: &Json, path: &[String]) -> Option<(Value, DataType)> {
    let mut node = json;
    for key in path {
        node = match node {
            Json::Object(map) => map.get(key)?,
            Json::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match node {
        Json::String(s) => Some((Value::scalar(s.clone()), DataType::String)),
        Json::Number(n) => Some((Value::scalar(n.to_string()), DataType::String)),
        Json::Bool(b) => Some((Value::scalar(b.to_string()), DataType::String)),
        Json::Null => None,
        other => Some((Value::Container(other.clone()), DataType::Container)),
    }
}

// ──────────────────────────────────────────────
// Guards
// ──────────────────────────────────────────────

/// Pops its frame on drop. Derefs to the context.
pub struct FrameGuard<'a> {
    ctx: &'a mut EvalContext,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.ctx.pop_frame();
    }
}

impl Deref for FrameGuard<'_> {
    type Target = EvalContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

/// Holds the `this` bindings of one iteration step and removes them on
/// drop. Derefs to the context.
pub struct IterationGuard<'a> {
    ctx: &'a mut EvalContext,
    bound: Vec<String>,
}

impl IterationGuard<'_> {
    pub fn bind(&mut self, lval: &str, value: Value) {
        self.ctx.put_special(SpecialScope::This, lval, value);
        if !self.bound.iter().any(|b| b == lval) {
            self.bound.push(lval.to_string());
        }
    }
}

impl Drop for IterationGuard<'_> {
    fn drop(&mut self) {
        for lval in self.bound.drain(..) {
            self.ctx.remove_special(SpecialScope::This, &lval);
        }
    }
}

impl Deref for IterationGuard<'_> {
    type Target = EvalContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for IterationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn r(text: &str) -> VarRef {
        VarRef::parse(text).unwrap()
    }

    #[test]
    fn local_class_shadows_and_disappears_with_frame() {
        let mut ctx = EvalContext::new();
        {
            let mut frame = ctx.push_frame(Bundle::new("default", "b1"));
            frame
                .class_activate("default", "tmp", true, ContextScope::Bundle)
                .unwrap();
            assert!(frame.class_is_defined("default", "tmp"));
        }
        assert!(!ctx.class_is_defined("default", "tmp"));
        assert_eq!(ctx.frame_depth(), 0);
    }

    #[test]
    fn frame_is_popped_on_early_return() {
        fn fails(ctx: &mut EvalContext) -> Result<(), ContextError> {
            let mut frame = ctx.push_frame(Bundle::new("default", "b"));
            frame.class_activate("default", "linux", true, ContextScope::Bundle)?;
            Ok(())
        }

        let mut ctx = EvalContext::new();
        ctx.class_put_hard("linux").unwrap();
        assert!(fails(&mut ctx).is_err());
        assert_eq!(ctx.frame_depth(), 0);
    }

    #[test]
    fn bundle_scope_requires_a_frame() {
        let mut ctx = EvalContext::new();
        let err = ctx
            .class_activate("default", "x", true, ContextScope::Bundle)
            .unwrap_err();
        assert_eq!(err, ContextError::NoActiveFrame { class: "x".into() });
    }

    #[test]
    fn deactivating_hard_class_is_fatal() {
        let mut ctx = EvalContext::new();
        ctx.class_put_hard("linux").unwrap();
        assert_eq!(
            ctx.class_deactivate("default", "linux"),
            Err(ContextError::HardClassNegation {
                class: "linux".into()
            })
        );
        assert!(ctx.class_is_defined("default", "linux"));
    }

    #[test]
    fn deactivating_unknown_soft_class_is_a_noop() {
        let mut ctx = EvalContext::new();
        assert_eq!(ctx.class_deactivate("default", "never"), Ok(false));
        ctx.class_activate("default", "web", true, ContextScope::Namespace)
            .unwrap();
        assert_eq!(ctx.class_deactivate("default", "web"), Ok(true));
        assert!(!ctx.class_is_defined("default", "web"));
    }

    #[test]
    fn most_local_variable_wins() {
        let mut ctx = EvalContext::new();
        ctx.variable_put_global(&r("default:b.x"), Value::scalar("global"), DataType::String);
        {
            let mut frame = ctx.push_frame(Bundle::new("default", "b"));
            frame.variable_put(&r("x"), Value::scalar("local"), DataType::String);
            assert_eq!(
                frame.variable_get(&r("x")),
                Some((Value::scalar("local"), DataType::String))
            );
            assert_eq!(frame.visible_variables().len(), 1);
        }
        assert_eq!(
            ctx.variable_get(&r("default:b.x")),
            Some((Value::scalar("global"), DataType::String))
        );
    }

    #[test]
    fn unqualified_reference_uses_active_bundle() {
        let mut ctx = EvalContext::new();
        ctx.variable_put_global(&r("ops:web.port"), Value::scalar("80"), DataType::Int);
        let frame = ctx.push_frame(Bundle::new("ops", "web"));
        assert_eq!(
            frame.variable_get(&r("port")).map(|(v, _)| v),
            Some(Value::scalar("80"))
        );
        assert!(frame.variable_get(&r("db.port")).is_none());
    }

    #[test]
    fn stored_lists_are_normalized() {
        let mut ctx = EvalContext::new();
        ctx.variable_put(
            &r("l"),
            Value::List(vec![Value::scalar("cf_null")]),
            DataType::StringList,
        );
        let (value, _) = ctx.variable_get(&r("l")).unwrap();
        assert_eq!(value, Value::empty_list());
    }

    #[test]
    fn container_indexing_walks_into_data() {
        let mut ctx = EvalContext::new();
        ctx.variable_put(
            &r("cfg"),
            Value::Container(json!({"servers": ["a", "b"], "port": 80})),
            DataType::Container,
        );
        assert_eq!(
            ctx.variable_get(&r("cfg[servers][1]")),
            Some((Value::scalar("b"), DataType::String))
        );
        assert_eq!(
            ctx.variable_get(&r("cfg[port]")).map(|(v, _)| v),
            Some(Value::scalar("80"))
        );
        assert!(ctx.variable_get(&r("cfg[missing]")).is_none());
    }

    #[test]
    fn iteration_bindings_are_cleared_on_drop() {
        let mut ctx = EvalContext::new();
        {
            let mut step = ctx.iteration();
            step.bind("k", Value::scalar("key"));
            step.bind("this", Value::scalar("item"));
            assert_eq!(
                step.variable_get(&r("this.k")).map(|(v, _)| v),
                Some(Value::scalar("key"))
            );
            assert_eq!(
                step.variable_get(&r("this")).map(|(v, _)| v),
                Some(Value::scalar("item"))
            );
        }
        assert!(ctx.get_special(SpecialScope::This, "k").is_none());
        assert!(ctx.variable_get(&r("this")).is_none());
    }

    #[test]
    fn array_entries_follow_definition_order() {
        let mut ctx = EvalContext::new();
        for (k, v) in [("b", "2"), ("a", "1")] {
            ctx.variable_put(&r("arr").with_index(k), Value::scalar(v), DataType::String);
        }
        ctx.variable_put(&r("arrx[z]"), Value::scalar("no"), DataType::String);
        let keys: Vec<&str> = ctx
            .array_entries(&r("arr"))
            .into_iter()
            .map(|v| v.reference.indices[0].as_str())
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn variable_remove_targets_most_local() {
        let mut ctx = EvalContext::new();
        ctx.variable_put_global(&r("default:b.x"), Value::scalar("g"), DataType::String);
        let mut frame = ctx.push_frame(Bundle::new("default", "b"));
        frame.variable_put(&r("x"), Value::scalar("l"), DataType::String);
        assert!(frame.variable_remove(&r("x")));
        assert_eq!(frame.variable_get(&r("x")).map(|(v, _)| v), Some(Value::scalar("g")));
    }
}

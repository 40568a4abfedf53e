//! Structural type checker.
//!
//! `check(value, type, env)` dispatches on the term variant, recurses into
//! substructure and resolves `Ref` names through the environment. It is a
//! pure function: success is `Ok(())`, every failure is a `TypeError` value.
//!
//! Failure shape follows the term:
//! - `Union` aggregates the failure of every alternative, in order (the chain).
//! - `Struct`, `Map`, `List` and `Tuple` short-circuit on the first failing
//!   element and return that element's failure unchanged.
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::data::{canonical_eq, describe};
use crate::env::Env;
use crate::types::{Basic, Bindings, Type, TypeKind};

/// Depth guard against `Let`/`Ref` cycles that never reach a concrete term.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Checks no deeper than this run on the caller's stack.
const INLINE_DEPTH: usize = 64;
/// Stack reserved per checker step when a check needs its own thread.
const STACK_BYTES_PER_STEP: usize = 16 * 1024;
const BASE_STACK_BYTES: usize = 256 * 1024;

/// Checker-internal result, with the error boxed.
type Step = Result<(), Box<TypeError>>;

// ————————————————————————————————————————————————————————————————————————————
// ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "error")]
pub enum TypeError {
    /// The value's shape or kind does not match the expected variant.
    #[serde(rename = "cannot coerce term into type")]
    #[error("cannot coerce {} into {ty}", describe(.term.as_ref()))]
    Mismatch {
        #[serde(rename = "type")]
        ty: Type,
        #[serde(skip_serializing_if = "Option::is_none")]
        term: Option<Value>,
    },
    #[serde(rename = "literal mismatch")]
    #[error("{} is not {ty}", describe(.term.as_ref()))]
    LiteralMismatch {
        #[serde(rename = "type")]
        ty: Type,
        #[serde(skip_serializing_if = "Option::is_none")]
        term: Option<Value>,
    },
    #[serde(rename = "union exhausted")]
    #[error("no alternative of {ty} matched {}", describe(.term.as_ref()))]
    UnionExhausted {
        #[serde(rename = "type")]
        ty: Type,
        #[serde(skip_serializing_if = "Option::is_none")]
        term: Option<Value>,
        chain: Vec<TypeError>,
    },
    #[serde(rename = "unknown ref")]
    #[error("unknown ref `{ref_name}`")]
    UnknownRef { ref_name: String, bindings: Bindings },
    #[serde(rename = "recursion limit exceeded")]
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimit { limit: usize },
}

impl TypeError {
    /// The offending value, when the failure carries one. `None` for a missing value.
    pub fn term(&self) -> Option<&Value> {
        match self {
            TypeError::Mismatch { term, .. }
            | TypeError::LiteralMismatch { term, .. }
            | TypeError::UnionExhausted { term, .. } => term.as_ref(),
            TypeError::UnknownRef { .. } | TypeError::RecursionLimit { .. } => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TypeError::RecursionLimit { .. })
    }

    /// Multi-line rendering: one line per failure, union chains indented
    /// under their union.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(out, "{:indent$}{self}", "", indent = depth * 2);
        if let TypeError::UnionExhausted { chain, .. } = self {
            for alt in chain {
                alt.render_into(out, depth + 1);
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CHECKER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy)]
pub struct Checker {
    pub max_depth: usize,
}

impl Default for Checker {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// Check `value` (or the missing marker) against `ty` in an empty environment.
pub fn typecheck(value: Option<&Value>, ty: &Type) -> Result<(), TypeError> {
    Checker::default().check(value, ty)
}

/// Check `value` against `ty` with the names of `env` in scope.
pub fn typecheck_in<'t>(
    value: Option<&Value>,
    ty: &'t Type,
    env: &Env<'_, 't>,
) -> Result<(), TypeError> {
    Checker::default().check_in(value, ty, env)
}

impl Checker {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn check(&self, value: Option<&Value>, ty: &Type) -> Result<(), TypeError> {
        self.check_in(value, ty, &Env::empty())
    }

    /// Shallow checks run in place. A check that outgrows `INLINE_DEPTH` is
    /// rerun on a thread whose stack is sized for `max_depth`.
    pub fn check_in<'t>(
        &self,
        value: Option<&Value>,
        ty: &'t Type,
        env: &Env<'_, 't>,
    ) -> Result<(), TypeError> {
        let inline_limit = self.max_depth.min(INLINE_DEPTH);
        match self.check_at(value, ty, env, 0, inline_limit) {
            Err(err) if err.is_fatal() && inline_limit < self.max_depth => {
                self.check_on_own_stack(value, ty, env)
            }
            result => result.map_err(|err| *err),
        }
    }

    fn stack_size(&self) -> usize {
        self.max_depth
            .saturating_add(1)
            .saturating_mul(STACK_BYTES_PER_STEP)
            .saturating_add(BASE_STACK_BYTES)
    }

    fn check_on_own_stack<'t>(
        &self,
        value: Option<&Value>,
        ty: &'t Type,
        env: &Env<'_, 't>,
    ) -> Result<(), TypeError> {
        let stack_size = self.stack_size();
        tracing::debug!(max_depth = self.max_depth, stack_size, "deep check");
        std::thread::scope(|scope| {
            let spawned = std::thread::Builder::new()
                .name("hoshi-check".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, || self.check_at(value, ty, env, 0, self.max_depth));
            match spawned {
                Ok(handle) => match handle.join() {
                    Ok(result) => result.map_err(|err| *err),
                    Err(panic) => std::panic::resume_unwind(panic),
                },
                Err(error) => {
                    tracing::warn!(%error, stack_size, "cannot spawn checker thread");
                    Err(TypeError::RecursionLimit { limit: INLINE_DEPTH })
                }
            }
        })
    }

    fn check_at<'t>(
        &self,
        value: Option<&Value>,
        mut ty: &'t Type,
        env: &Env<'_, 't>,
        mut depth: usize,
        limit: usize,
    ) -> Step {
        // `Ref` chains resolve in place; only substructure grows the stack.
        loop {
            if depth > limit {
                return Err(Box::new(TypeError::RecursionLimit { limit }));
            }
            tracing::trace!(kind = ty.kind.tag(), depth, "typecheck");

            let current: &'t Type = ty;
            let next = depth + 1;
            return match &current.kind {
                TypeKind::Ref { name } => match env.lookup(name) {
                    Some(resolved) => {
                        ty = resolved;
                        depth = next;
                        continue;
                    }
                    None => {
                        tracing::debug!(name = %name, "unresolved ref");
                        Err(Box::new(TypeError::UnknownRef {
                            ref_name: name.clone(),
                            bindings: env.snapshot(),
                        }))
                    }
                },
                TypeKind::Let { bindings, t } => {
                    let inner = env.extend(bindings);
                    self.check_at(value, t, &inner, next, limit)
                }
                TypeKind::Basic { sub } => {
                    if basic_accepts(*sub, value) {
                        Ok(())
                    } else {
                        Err(mismatch(current, value))
                    }
                }
                TypeKind::Literal { value: expected } => match value {
                    Some(v) if canonical_eq(v, expected) => Ok(()),
                    _ => Err(Box::new(TypeError::LiteralMismatch {
                        ty: current.clone(),
                        term: value.cloned(),
                    })),
                },
                TypeKind::Union { alts } => {
                    self.check_union(value, current, alts, env, next, limit)
                }
                TypeKind::Struct { fields } => {
                    let Some(Value::Object(obj)) = value else {
                        return Err(mismatch(current, value));
                    };
                    // Undeclared keys are ignored; absent ones are checked as missing.
                    for (name, field_ty) in fields {
                        self.check_at(obj.get(name), field_ty, env, next, limit)?;
                    }
                    Ok(())
                }
                TypeKind::Map { key, value: value_ty } => {
                    let Some(Value::Object(obj)) = value else {
                        return Err(mismatch(current, value));
                    };
                    for (k, v) in obj {
                        let k = Value::String(k.clone());
                        self.check_at(Some(&k), key, env, next, limit)?;
                        self.check_at(Some(v), value_ty, env, next, limit)?;
                    }
                    Ok(())
                }
                TypeKind::List { value: item } => {
                    let Some(Value::Array(xs)) = value else {
                        return Err(mismatch(current, value));
                    };
                    for x in xs {
                        self.check_at(Some(x), item, env, next, limit)?;
                    }
                    Ok(())
                }
                TypeKind::Tuple { fields } => {
                    let Some(Value::Array(xs)) = value else {
                        return Err(mismatch(current, value));
                    };
                    if xs.len() != fields.len() {
                        return Err(mismatch(current, value));
                    }
                    for (x, field_ty) in xs.iter().zip(fields) {
                        self.check_at(Some(x), field_ty, env, next, limit)?;
                    }
                    Ok(())
                }
            };
        }
    }

    #[inline(never)]
    fn check_union<'t>(
        &self,
        value: Option<&Value>,
        ty: &'t Type,
        alts: &'t [Type],
        env: &Env<'_, 't>,
        depth: usize,
        limit: usize,
    ) -> Step {
        let mut chain = Vec::new();
        for alt in alts {
            match self.check_at(value, alt, env, depth, limit) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => chain.push(*err),
            }
        }
        tracing::debug!(alts = alts.len(), "union exhausted");
        Err(Box::new(TypeError::UnionExhausted { ty: ty.clone(), term: value.cloned(), chain }))
    }
}

fn mismatch(ty: &Type, value: Option<&Value>) -> Box<TypeError> {
    Box::new(TypeError::Mismatch { ty: ty.clone(), term: value.cloned() })
}

fn basic_accepts(sub: Basic, value: Option<&Value>) -> bool {
    match (sub, value) {
        (Basic::Void, None) => true,
        (Basic::Null, Some(Value::Null)) => true,
        (Basic::Bool, Some(Value::Bool(_))) => true,
        (Basic::Int | Basic::Float, Some(Value::Number(_))) => true,
        (Basic::String, Some(Value::String(_))) => true,
        _ => false,
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use serde_json::json;

    fn ok(value: &Value, ty: &Type) -> bool {
        typecheck(Some(value), ty).is_ok()
    }

    fn cons_list() -> Type {
        Type::let_in(
            [(
                "list",
                Type::union([
                    Type::tuple([]),
                    Type::structure([("head", Type::int()), ("tail", Type::reference("list"))]),
                ]),
            )],
            Type::reference("list"),
        )
    }

    #[test]
    fn basics_match_runtime_kind() {
        assert!(ok(&json!(null), &Type::null()));
        assert!(ok(&json!(false), &Type::bool()));
        assert!(ok(&json!(3), &Type::int()));
        assert!(ok(&json!(3.5), &Type::int()));
        assert!(ok(&json!(3), &Type::float()));
        assert!(ok(&json!("s"), &Type::string()));

        assert!(!ok(&json!(0), &Type::null()));
        assert!(!ok(&json!("true"), &Type::bool()));
        assert!(!ok(&json!("3"), &Type::int()));
        assert!(!ok(&json!(null), &Type::string()));
        assert!(typecheck(None, &Type::string()).is_err());
    }

    #[test]
    fn void_accepts_only_missing() {
        assert_eq!(typecheck(None, &Type::void()), Ok(()));
        for v in [json!(null), json!(0), json!(""), json!([]), json!({}), json!(false)] {
            assert!(!ok(&v, &Type::void()), "void accepted {v}");
        }
    }

    #[test]
    fn literals_compare_canonically() {
        let values = [json!(1), json!("a"), json!(null), json!([1, {"b": 1}]), json!({"x": [1]})];
        for v in values {
            assert!(ok(&v, &Type::literal(v.clone())), "literal rejected itself: {v}");
        }
        assert!(ok(&json!({"b": 2, "a": 1}), &Type::literal(json!({"a": 1, "b": 2}))));
        let err = typecheck(Some(&json!("b")), &Type::literal("a")).unwrap_err();
        assert_eq!(
            err,
            TypeError::LiteralMismatch { ty: Type::literal("a"), term: Some(json!("b")) }
        );
        assert!(typecheck(None, &Type::literal(json!(null))).is_err());
    }

    #[test]
    fn union_chain_follows_alternative_order() {
        let a = Type::string();
        let b = Type::literal(1);
        let value = json!(true);

        let err = typecheck(Some(&value), &Type::union([a.clone(), b.clone()])).unwrap_err();
        let TypeError::UnionExhausted { chain, .. } = &err else { panic!("{err:?}") };
        assert_eq!(chain[0], TypeError::Mismatch { ty: a.clone(), term: Some(value.clone()) });
        assert_eq!(
            chain[1],
            TypeError::LiteralMismatch { ty: b.clone(), term: Some(value.clone()) }
        );

        let err = typecheck(Some(&value), &Type::union([b.clone(), a.clone()])).unwrap_err();
        let TypeError::UnionExhausted { chain, .. } = &err else { panic!("{err:?}") };
        assert_eq!(chain[0], TypeError::LiteralMismatch { ty: b, term: Some(value.clone()) });
        assert_eq!(chain[1], TypeError::Mismatch { ty: a, term: Some(value) });
    }

    #[test]
    fn union_success_is_order_independent() {
        let v = json!(1);
        assert!(ok(&v, &Type::union([Type::string(), Type::int()])));
        assert!(ok(&v, &Type::union([Type::int(), Type::string()])));
    }

    #[test]
    fn empty_union_never_conforms() {
        let err = typecheck(Some(&json!(1)), &Type::union([])).unwrap_err();
        let TypeError::UnionExhausted { chain, .. } = err else { panic!() };
        assert!(chain.is_empty());
    }

    #[test]
    fn union_chain_rendering() {
        let ty = Type::union([
            Type::string(),
            Type::union([Type::literal("a"), Type::null()]),
            Type::list(Type::int()),
        ]);
        let err = typecheck(Some(&json!(7)), &ty).unwrap_err();
        expect![[r#"
            no alternative of union of 3 matched 7
              cannot coerce 7 into string
              no alternative of union of 2 matched 7
                7 is not literal "a"
                cannot coerce 7 into null
              cannot coerce 7 into list of int
        "#]]
        .assert_eq(&err.render());
    }

    #[test]
    fn union_failure_serializes_with_chain() {
        let ty = Type::union([Type::string(), Type::int()]);
        let err = typecheck(Some(&json!(true)), &ty).unwrap_err();
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({
                "error": "union exhausted",
                "type": {"kind": "type-union", "alts": [
                    {"kind": "type-basic", "sub": "string"},
                    {"kind": "type-basic", "sub": "int"}
                ]},
                "term": true,
                "chain": [
                    {
                        "error": "cannot coerce term into type",
                        "type": {"kind": "type-basic", "sub": "string"},
                        "term": true
                    },
                    {
                        "error": "cannot coerce term into type",
                        "type": {"kind": "type-basic", "sub": "int"},
                        "term": true
                    }
                ]
            })
        );
    }

    #[test]
    fn struct_reports_first_failing_field_only() {
        let ty = Type::structure([("a", Type::string()), ("b", Type::int())]);
        let err = typecheck(Some(&json!({"a": 1, "b": 2})), &ty).unwrap_err();
        assert_eq!(err, TypeError::Mismatch { ty: Type::string(), term: Some(json!(1)) });

        let ty = Type::structure([("a", Type::string()), ("b", Type::string())]);
        let err = typecheck(Some(&json!({"a": 1, "b": 2})), &ty).unwrap_err();
        assert_eq!(err.term(), Some(&json!(1)));
    }

    #[test]
    fn struct_checks_in_declaration_order() {
        let ty = Type::structure([("b", Type::string()), ("a", Type::string())]);
        let err = typecheck(Some(&json!({"a": 1, "b": 2})), &ty).unwrap_err();
        assert_eq!(err.term(), Some(&json!(2)));
    }

    #[test]
    fn struct_optional_fields_and_extra_keys() {
        let ty = Type::structure([("name", Type::string()), ("nick", Type::maybe(Type::string()))]);
        assert!(ok(&json!({"name": "x"}), &ty));
        assert!(ok(&json!({"name": "x", "nick": "y"}), &ty));
        assert!(ok(&json!({"name": "x", "other": [1, 2]}), &ty));
        assert!(!ok(&json!({"name": "x", "nick": null}), &ty));

        let err = typecheck(Some(&json!({})), &ty).unwrap_err();
        assert_eq!(err, TypeError::Mismatch { ty: Type::string(), term: None });
        assert!(!ok(&json!([]), &ty));
    }

    #[test]
    fn map_checks_keys_then_values() {
        let ty = Type::map(Type::union([Type::literal("x"), Type::literal("y")]), Type::int());
        assert!(ok(&json!({}), &ty));
        assert!(ok(&json!({"x": 1, "y": 2}), &ty));

        let err = typecheck(Some(&json!({"x": 1, "z": "bad"})), &ty).unwrap_err();
        let TypeError::UnionExhausted { term, .. } = &err else { panic!("{err:?}") };
        assert_eq!(term, &Some(json!("z")));

        let err = typecheck(Some(&json!({"x": "bad", "z": 1})), &ty).unwrap_err();
        assert_eq!(err, TypeError::Mismatch { ty: Type::int(), term: Some(json!("bad")) });
        assert!(!ok(&json!([1]), &ty));
    }

    #[test]
    fn list_short_circuits_on_first_bad_index() {
        let ty = Type::list(Type::int());
        assert!(ok(&json!([]), &ty));
        assert!(ok(&json!([1, 2, 3]), &ty));
        let err = typecheck(Some(&json!([1, "two", null])), &ty).unwrap_err();
        assert_eq!(err.term(), Some(&json!("two")));
        assert!(!ok(&json!({"0": 1}), &ty));
    }

    #[test]
    fn tuple_requires_exact_arity() {
        let ty = Type::tuple([Type::string(), Type::int()]);
        assert!(ok(&json!(["a", 1]), &ty));
        assert!(!ok(&json!(["a"]), &ty));
        assert!(!ok(&json!(["a", 1, 2]), &ty));

        let err = typecheck(Some(&json!([1, "a"])), &ty).unwrap_err();
        assert_eq!(err, TypeError::Mismatch { ty: Type::string(), term: Some(json!(1)) });

        let err = typecheck(Some(&json!(["a"])), &ty).unwrap_err();
        assert_eq!(err, TypeError::Mismatch { ty, term: Some(json!(["a"])) });
    }

    #[test]
    fn recursive_list_resolves_through_let() {
        let ty = cons_list();
        assert!(ok(&json!([]), &ty));
        assert!(ok(&json!({"head": 1, "tail": []}), &ty));
        assert!(ok(&json!({"head": 1, "tail": {"head": 2, "tail": []}}), &ty));
        assert!(!ok(&json!({"head": 1, "tail": "nil"}), &ty));
        assert!(!ok(&json!({"head": "1", "tail": []}), &ty));
    }

    #[test]
    fn unknown_ref_carries_name_and_bindings() {
        let ty = Type::let_in([("a", Type::int())], Type::reference("b"));
        let err = typecheck(Some(&json!(1)), &ty).unwrap_err();
        let TypeError::UnknownRef { ref_name, bindings } = err else { panic!() };
        assert_eq!(ref_name, "b");
        assert_eq!(bindings.keys().collect::<Vec<_>>(), ["a"]);
        assert_eq!(bindings["a"], Type::int());
    }

    #[test]
    fn let_bindings_do_not_leak_to_siblings() {
        let ty = Type::tuple([
            Type::let_in([("x", Type::int())], Type::reference("x")),
            Type::reference("x"),
        ]);
        let err = typecheck(Some(&json!([1, 2])), &ty).unwrap_err();
        assert!(matches!(err, TypeError::UnknownRef { ref_name, .. } if ref_name == "x"));
    }

    #[test]
    fn inner_let_shadows_outer() {
        let ty = Type::let_in(
            [("x", Type::int())],
            Type::tuple([
                Type::reference("x"),
                Type::let_in([("x", Type::string())], Type::reference("x")),
            ]),
        );
        assert!(ok(&json!([1, "s"]), &ty));
        assert!(!ok(&json!([1, 2]), &ty));
    }

    #[test]
    fn ref_resolution_keeps_whole_environment() {
        let ty = Type::let_in(
            [
                ("pair", Type::tuple([Type::reference("leaf"), Type::reference("leaf")])),
                ("leaf", Type::bool()),
            ],
            Type::reference("pair"),
        );
        assert!(ok(&json!([true, false]), &ty));
    }

    #[test]
    fn env_supplied_by_caller() {
        let bindings: Bindings = [("id".to_string(), Type::string())].into_iter().collect();
        let env = Env::root(&bindings);
        let ty = Type::reference("id");
        assert_eq!(typecheck_in(Some(&json!("abc")), &ty, &env), Ok(()));
        assert!(typecheck(Some(&json!("abc")), &ty).is_err());
    }

    fn ping_pong() -> Type {
        Type::let_in(
            [("a", Type::reference("b")), ("b", Type::reference("a"))],
            Type::reference("a"),
        )
    }

    fn self_loop() -> Type {
        Type::let_in(
            [("loop", Type::union([Type::reference("loop"), Type::int()]))],
            Type::reference("loop"),
        )
    }

    fn nested_lists(depth: usize) -> Value {
        (0..depth).fold(json!(1), |inner, _| json!([inner]))
    }

    #[test]
    fn cyclic_refs_hit_the_recursion_limit() {
        let err = Checker::with_max_depth(32).check(Some(&json!(1)), &ping_pong()).unwrap_err();
        assert_eq!(err, TypeError::RecursionLimit { limit: 32 });
    }

    #[test]
    fn recursion_limit_is_not_swallowed_by_unions() {
        let err = Checker::with_max_depth(16).check(Some(&json!(1)), &self_loop()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn default_guard_stops_cycles() {
        let limit = TypeError::RecursionLimit { limit: DEFAULT_MAX_DEPTH };
        assert_eq!(typecheck(Some(&json!(1)), &ping_pong()), Err(limit.clone()));
        assert_eq!(typecheck(Some(&json!(1)), &self_loop()), Err(limit));
    }

    #[test]
    fn deep_values_check_under_the_default_guard() {
        let ty = Type::let_in(
            [("nest", Type::union([Type::int(), Type::list(Type::reference("nest"))]))],
            Type::reference("nest"),
        );
        assert_eq!(typecheck(Some(&nested_lists(127)), &ty), Ok(()));

        let err = Checker::with_max_depth(100).check(Some(&nested_lists(127)), &ty).unwrap_err();
        assert_eq!(err, TypeError::RecursionLimit { limit: 100 });
    }

    #[test]
    fn deep_checks_reach_large_limits() {
        let ty = Type::let_in(
            [("nest", Type::union([Type::int(), Type::list(Type::reference("nest"))]))],
            Type::reference("nest"),
        );
        let checker = Checker::with_max_depth(4096);
        assert_eq!(checker.check(Some(&nested_lists(1000)), &ty), Ok(()));
        let err = checker.check(Some(&json!(1)), &self_loop()).unwrap_err();
        assert_eq!(err, TypeError::RecursionLimit { limit: 4096 });
    }

    #[test]
    fn meta_does_not_affect_checking() {
        let ty = Type::int().with_meta(json!({"min": 10, "max": 0}));
        assert!(ok(&json!(99), &ty));
    }
}

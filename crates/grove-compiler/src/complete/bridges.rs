//! Covariant bridge synthesis
//!
//! When a method overrides an inherited one with a narrower return type or
//! with parameters specialized through generics, the JVM sees two different
//! descriptors. A bridge with the inherited (erased) descriptor forwards to
//! the override so callers compiled against the supertype still dispatch
//! correctly.

use super::location;
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use rustc_hash::FxHashMap;

/// Generic parameter name → actual type argument
type GenericsSpec = FxHashMap<String, TypeRef>;

#[tracing::instrument(skip_all)]
pub fn synthesize(_ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    for id in unit.primary_classes() {
        if unit.class(id).is_interface() {
            continue;
        }
        check_exact_overrides(unit, id)?;
        let bridges = collect_bridges(unit, id)?;
        let class = unit.class_mut(id);
        for bridge in bridges {
            // an override with a narrower return type shares the bridge's
            // parameters but not its descriptor
            let descriptor = bridge.descriptor();
            if class
                .methods
                .iter()
                .any(|m| m.name == bridge.name && m.descriptor() == descriptor)
            {
                continue;
            }
            tracing::debug!(
                class = %class.name,
                bridge = %bridge.type_descriptor(),
                "adding bridge method"
            );
            class.methods.push(bridge);
        }
    }
    Ok(())
}

/// Same-descriptor overrides still may not override a final method or flip
/// the static modifier
fn check_exact_overrides(unit: &CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    for method in &class.methods {
        if method.modifiers.is_private() || method.is_static_init() {
            continue;
        }
        let params = method.erased_params();
        for ancestor in unit.superclasses(id) {
            let Some(old) = unit.class(ancestor).declared_method(&method.name, &params) else {
                continue;
            };
            if old.modifiers.is_private() {
                break;
            }
            let owner = unit.class(ancestor).name.clone();
            if old.modifiers.is_final() {
                return Err(CompileError::OverrideFinal {
                    method: old.type_descriptor(),
                    owner,
                    location: location(unit, id, method.pos),
                });
            }
            if old.modifiers.is_static() != method.modifiers.is_static() {
                return Err(CompileError::StaticMismatch {
                    method: old.type_descriptor(),
                    owner,
                    location: location(unit, id, method.pos),
                });
            }
            break;
        }
    }
    Ok(())
}

/// Bridges `id` needs, keyed by their erased descriptor; later finds replace
/// earlier ones with the same key
fn collect_bridges(unit: &CompileUnit, id: ClassId) -> CompileResult<Vec<MethodNode>> {
    let class = unit.class(id);

    // instance methods callers outside the class can reach
    let declared: Vec<&MethodNode> = class
        .methods
        .iter()
        .filter(|m| {
            !m.modifiers.is_static()
                && (m.modifiers.is_public() || m.modifiers.is_protected())
                && !m.is_static_init()
        })
        .collect();

    // interface methods the class itself does not declare; a superclass
    // method may implement them covariantly
    let mut abstract_methods: Vec<&MethodNode> = Vec::new();
    for iface in unit.all_interfaces(id) {
        for method in &unit.class(iface).methods {
            if class.declared_method(&method.name, &method.erased_params()).is_none() {
                abstract_methods.push(method);
            }
        }
    }

    let mut collector = BridgeCollector {
        unit,
        class: id,
        declared,
        abstract_methods,
        found: Vec::new(),
    };
    collector.walk(id, &GenericsSpec::default())?;
    Ok(collector.found)
}

struct BridgeCollector<'a> {
    unit: &'a CompileUnit,
    class: ClassId,
    declared: Vec<&'a MethodNode>,
    abstract_methods: Vec<&'a MethodNode>,
    found: Vec<MethodNode>,
}

impl<'a> BridgeCollector<'a> {
    fn walk(&mut self, id: ClassId, spec: &GenericsSpec) -> CompileResult<()> {
        let unit = self.unit;
        let class = unit.class(id);

        if let Some(super_ref) = &class.super_class {
            if let Some(super_id) = unit.resolve(super_ref) {
                let super_spec = generics_spec(unit, super_id, super_ref, spec);
                let super_methods = &unit.class(super_id).methods;
                self.store_declared(super_methods, &super_spec)?;
                if !self.abstract_methods.is_empty() {
                    for method in super_methods.iter().filter(|m| !m.modifiers.is_static()) {
                        let abstract_methods = self.abstract_methods.clone();
                        self.store(
                            abstract_methods.into_iter(),
                            method,
                            &GenericsSpec::default(),
                            true,
                        )?;
                    }
                }
                self.walk(super_id, &super_spec)?;
            }
        }

        for iface_ref in &class.interfaces {
            let Some(iface) = unit.resolve(iface_ref) else {
                continue;
            };
            let iface_spec = generics_spec(unit, iface, iface_ref, spec);
            self.store_declared(&unit.class(iface).methods, &iface_spec)?;
            self.walk(iface, &iface_spec)?;
        }
        Ok(())
    }

    fn store_declared(&mut self, old_methods: &'a [MethodNode], spec: &GenericsSpec) -> CompileResult<()> {
        let declared = self.declared.clone();
        for method in declared {
            self.store(old_methods.iter(), method, spec, false)?;
        }
        Ok(())
    }

    /// Record a bridge for the first of `old_methods` that `method`
    /// overrides covariantly
    fn store(
        &mut self,
        old_methods: impl Iterator<Item = &'a MethodNode>,
        method: &'a MethodNode,
        spec: &GenericsSpec,
        ignore_error: bool,
    ) -> CompileResult<()> {
        for old in old_methods {
            if let Some(bridge) = self.covariant_implementation(old, method, spec, ignore_error)? {
                let key = bridge.descriptor();
                self.found.retain(|b| b.descriptor() != key);
                self.found.push(bridge);
                return Ok(());
            }
        }
        Ok(())
    }

    fn covariant_implementation(
        &self,
        old: &MethodNode,
        method: &MethodNode,
        spec: &GenericsSpec,
        ignore_error: bool,
    ) -> CompileResult<Option<MethodNode>> {
        if old.name != method.name
            || old.modifiers.contains(Modifiers::BRIDGE)
            || method.modifiers.contains(Modifiers::BRIDGE)
            || old.modifiers.is_private()
            || old.params.len() != method.params.len()
        {
            return Ok(None);
        }

        let mut spec = spec.clone();
        for generic in &old.generics {
            spec.entry(generic.name.clone())
                .or_insert_with(|| generic.bound.clone());
        }

        let equal_params = old
            .params
            .iter()
            .zip(&method.params)
            .all(|(o, n)| o.ty.erasure() == n.ty.erasure());
        if !equal_params {
            let equal_with_generics = old
                .params
                .iter()
                .zip(&method.params)
                .all(|(o, n)| correct_to_spec(&spec, &o.ty).erasure() == n.ty.erasure());
            if !equal_with_generics {
                return Ok(None);
            }
        }

        let new_return = &method.return_type;
        let old_return = &old.return_type;
        let equal_return = new_return.erasure() == old_return.erasure();
        let corrected = correct_to_spec(&spec, old_return);

        let unit = self.unit;
        let class = unit.class(self.class);
        let owner = self.owner_of(old);
        let at = location(unit, self.class, method.pos);

        // primitive return types are left to the primitive-ness check below
        let compatible = new_return.is_primitive()
            || old_return.is_primitive()
            || unit.is_assignable(new_return, &corrected);
        if !compatible {
            if ignore_error {
                return Ok(None);
            }
            return Err(CompileError::IncompatibleReturnType {
                method: method.type_descriptor(),
                class: class.name.clone(),
                expected: corrected.display_name(),
                owner,
                location: at,
            });
        }

        if equal_return && equal_params {
            return Ok(None);
        }

        if old.modifiers.is_final() {
            return Err(CompileError::OverrideFinal {
                method: old.type_descriptor(),
                owner,
                location: at,
            });
        }
        if old.modifiers.is_static() != method.modifiers.is_static() {
            return Err(CompileError::StaticMismatch {
                method: old.type_descriptor(),
                owner,
                location: at,
            });
        }
        if !equal_return {
            let reason = match (old_return.is_primitive(), new_return.is_primitive()) {
                (true, true) => Some("old and new method having different primitive return types"),
                (false, true) => Some("new method having a primitive return type and old method not"),
                (true, false) => Some("old method having a primitive return type and new method not"),
                (false, false) => None,
            };
            if let Some(reason) = reason {
                if ignore_error {
                    return Ok(None);
                }
                return Err(CompileError::PrimitiveReturnMismatch {
                    method: old.type_descriptor(),
                    owner,
                    reason,
                    location: at,
                });
            }
        }

        let b = unit.builder();
        let params = old
            .params
            .iter()
            .map(|p| Parameter::new(p.name.clone(), p.ty.erasure()))
            .collect();
        let body = b.synthetic(SyntheticBody::Bridge {
            target_params: method.erased_params(),
            target_return: new_return.erasure(),
            is_interface: class.is_interface(),
        });
        let mut bridge = MethodNode::new(
            old.name.clone(),
            method.modifiers.without(Modifiers::ABSTRACT) | Modifiers::SYNTHETIC | Modifiers::BRIDGE,
            old_return.erasure(),
        )
        .with_params(params)
        .with_body(body);
        bridge.exceptions = old.exceptions.clone();
        bridge.pos = method.pos;
        Ok(Some(bridge))
    }

    /// Name of the class declaring `method`
    fn owner_of(&self, method: &MethodNode) -> String {
        let unit = self.unit;
        std::iter::once(self.class)
            .chain(unit.superclasses(self.class))
            .chain(unit.all_interfaces(self.class))
            .map(|id| unit.class(id))
            .find(|c| c.methods.iter().any(|m| std::ptr::eq(m, method)))
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }
}

/// Bind the generic parameters of `id` to the arguments `reference` gives
/// them, seen through the bindings of the subclass
fn generics_spec(unit: &CompileUnit, id: ClassId, reference: &TypeRef, outer: &GenericsSpec) -> GenericsSpec {
    let mut spec = GenericsSpec::default();
    let TypeRef::Class { generics: args, .. } = reference else {
        return spec;
    };
    for (param, arg) in unit.class(id).generics.iter().zip(args) {
        spec.insert(param.name.clone(), correct_to_spec(outer, arg));
    }
    spec
}

fn correct_to_spec(spec: &GenericsSpec, ty: &TypeRef) -> TypeRef {
    match ty {
        TypeRef::Placeholder { name, .. } => spec.get(name).cloned().unwrap_or_else(|| ty.clone()),
        TypeRef::Array(component) => TypeRef::array(correct_to_spec(spec, component)),
        TypeRef::Class { name, generics } => TypeRef::generic(
            name.clone(),
            generics.iter().map(|g| correct_to_spec(spec, g)).collect(),
        ),
        TypeRef::Primitive(_) => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, ret: TypeRef, params: &[TypeRef]) -> MethodNode {
        MethodNode::new(name, Modifiers::PUBLIC, ret).with_params(
            params
                .iter()
                .enumerate()
                .map(|(i, t)| Parameter::new(format!("p{}", i), t.clone()))
                .collect(),
        )
    }

    fn base_and_sub(base_method: MethodNode, sub_method: MethodNode) -> (CompileUnit, ClassId) {
        let mut unit = CompileUnit::new();
        let mut base = ClassNode::new("p.Base", ClassKind::Class);
        base.source_file = Some("Base.groovy".into());
        base.methods.push(base_method);
        unit.add_class(base);
        let mut sub = ClassNode::new("p.Sub", ClassKind::Class).with_super(TypeRef::class("p.Base"));
        sub.source_file = Some("Sub.groovy".into());
        sub.methods.push(sub_method.with_body(unit.builder().block(vec![])));
        let sub = unit.add_class(sub);
        (unit, sub)
    }

    fn bridges_of(unit: &CompileUnit, id: ClassId) -> Vec<&MethodNode> {
        unit.class(id)
            .methods
            .iter()
            .filter(|m| m.modifiers.contains(Modifiers::BRIDGE))
            .collect()
    }

    #[test]
    fn test_covariant_return_gets_bridge() {
        let (mut unit, sub) = base_and_sub(
            method("make", TypeRef::object(), &[]),
            method("make", TypeRef::string(), &[]),
        );
        synthesize(&CompilationContext::default(), &mut unit).unwrap();
        let bridges = bridges_of(&unit, sub);
        assert_eq!(bridges.len(), 1);
        let bridge = bridges[0];
        assert_eq!(bridge.descriptor(), "()Ljava/lang/Object;");
        assert!(bridge.modifiers.contains(Modifiers::SYNTHETIC));
        assert!(matches!(
            &bridge.body.as_ref().unwrap().kind,
            StmtKind::Synthetic(SyntheticBody::Bridge { target_return, .. }) if *target_return == TypeRef::string()
        ));
    }

    #[test]
    fn test_identical_override_needs_no_bridge() {
        let (mut unit, sub) = base_and_sub(
            method("make", TypeRef::string(), &[TypeRef::int()]),
            method("make", TypeRef::string(), &[TypeRef::int()]),
        );
        synthesize(&CompilationContext::default(), &mut unit).unwrap();
        assert!(bridges_of(&unit, sub).is_empty());
    }

    #[test]
    fn test_generic_interface_parameter_gets_bridge() {
        let mut unit = CompileUnit::new();
        let mut class = ClassNode::new("p.Version", ClassKind::Class);
        class
            .interfaces
            .push(TypeRef::generic("java.lang.Comparable", vec![TypeRef::class("p.Version")]));
        class.methods.push(
            method("compareTo", TypeRef::int(), &[TypeRef::class("p.Version")])
                .with_body(unit.builder().block(vec![])),
        );
        let id = unit.add_class(class);
        synthesize(&CompilationContext::default(), &mut unit).unwrap();
        let bridges = bridges_of(&unit, id);
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].descriptor(), "(Ljava/lang/Object;)I");
        assert!(matches!(
            &bridges[0].body.as_ref().unwrap().kind,
            StmtKind::Synthetic(SyntheticBody::Bridge { target_params, .. })
                if *target_params == vec![TypeRef::class("p.Version")]
        ));
    }

    #[test]
    fn test_overriding_final_method_is_fatal() {
        let mut old = method("make", TypeRef::object(), &[]);
        old.modifiers |= Modifiers::FINAL;
        let (mut unit, _) = base_and_sub(old, method("make", TypeRef::string(), &[]));
        let err = synthesize(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(matches!(err, CompileError::OverrideFinal { .. }));
        assert!(err
            .to_string()
            .contains("Cannot override final method java.lang.Object make() in p.Base"));
    }

    #[test]
    fn test_exact_override_of_final_method_is_fatal() {
        let mut old = method("make", TypeRef::object(), &[]);
        old.modifiers |= Modifiers::FINAL;
        let (mut unit, _) = base_and_sub(old, method("make", TypeRef::object(), &[]));
        let err = synthesize(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(matches!(err, CompileError::OverrideFinal { .. }));
    }

    #[test]
    fn test_static_instance_mismatch_is_fatal() {
        let mut old = method("make", TypeRef::object(), &[]);
        old.modifiers |= Modifiers::STATIC;
        let (mut unit, _) = base_and_sub(old, method("make", TypeRef::object(), &[]));
        let err = synthesize(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(err.to_string().contains("with disparate static modifier"));
    }

    #[test]
    fn test_primitive_return_change_is_fatal() {
        let (mut unit, _) = base_and_sub(
            method("size", TypeRef::object(), &[]),
            method("size", TypeRef::int(), &[]),
        );
        let err = synthesize(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(err.to_string().ends_with(
            "Cannot override method java.lang.Object size() in p.Base with new method having a primitive return type and old method not"
        ));
    }

    #[test]
    fn test_incompatible_return_type_is_fatal() {
        let (mut unit, _) = base_and_sub(
            method("make", TypeRef::string(), &[]),
            method("make", TypeRef::class("java.lang.Integer"), &[]),
        );
        let err = synthesize(&CompilationContext::default(), &mut unit).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sub.groovy: The return type of java.lang.Integer make() in p.Sub is incompatible with java.lang.String in p.Base"
        );
    }

    #[test]
    fn test_private_methods_are_not_bridged() {
        let mut old = method("make", TypeRef::object(), &[]);
        old.modifiers = Modifiers::PRIVATE;
        let (mut unit, sub) = base_and_sub(old, method("make", TypeRef::string(), &[]));
        synthesize(&CompilationContext::default(), &mut unit).unwrap();
        assert!(bridges_of(&unit, sub).is_empty());
    }
}

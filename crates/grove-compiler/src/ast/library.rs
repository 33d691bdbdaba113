//! Library class stubs
//!
//! Hierarchy queries (accessor lookup, bridge detection, annotation
//! metadata) need the shape of the JDK and Groovy runtime classes the
//! generated code links against. These stubs carry just that shape.

use super::*;

fn stub(name: &str, kind: ClassKind, modifiers: Modifiers, super_class: Option<&str>) -> ClassNode {
    let mut class = ClassNode::new(name, kind);
    class.modifiers = modifiers;
    class.super_class = super_class.map(TypeRef::class);
    class.is_primary = false;
    class
}

fn method(name: &str, modifiers: Modifiers, ret: TypeRef, params: &[TypeRef]) -> MethodNode {
    MethodNode::new(name, modifiers, ret).with_params(
        params
            .iter()
            .enumerate()
            .map(|(i, ty)| Parameter::new(format!("arg{}", i), ty.clone()))
            .collect(),
    )
}

fn ctor(modifiers: Modifiers, params: &[TypeRef]) -> MethodNode {
    method("<init>", modifiers, TypeRef::void(), params)
}

fn interface(name: &str) -> ClassNode {
    stub(
        name,
        ClassKind::Interface,
        Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT,
        Some(names::OBJECT),
    )
}

fn enum_stub(name: &str, constants: &[&str]) -> ClassNode {
    let mut class = stub(
        name,
        ClassKind::Enum,
        Modifiers::PUBLIC | Modifiers::FINAL | Modifiers::ENUM,
        Some(names::ENUM),
    );
    for constant in constants {
        class.fields.push(FieldNode::new(
            *constant,
            TypeRef::class(name),
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL | Modifiers::ENUM,
        ));
    }
    class
}

fn annotation_type(name: &str, members: Vec<MethodNode>) -> ClassNode {
    let mut class = stub(
        name,
        ClassKind::Annotation,
        Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT | Modifiers::ANNOTATION,
        Some(names::OBJECT),
    );
    class.interfaces.push(TypeRef::class(names::ANNOTATION));
    class.methods = members;
    class
}

fn runtime_retention(b: &AstBuilder) -> AnnotationNode {
    b.annotation(
        TypeRef::class(names::RETENTION),
        vec![(
            "value",
            b.prop(b.class_lit(TypeRef::class(names::RETENTION_POLICY)), "RUNTIME"),
        )],
    )
}

/// Every stub, in dependency order
pub fn stubs(b: &AstBuilder) -> Vec<ClassNode> {
    let public = Modifiers::PUBLIC;
    let abstract_ = Modifiers::PUBLIC | Modifiers::ABSTRACT;
    let object = TypeRef::object;
    let string = TypeRef::string;
    let mut out = Vec::new();

    let mut obj = stub(names::OBJECT, ClassKind::Class, public, None);
    obj.constructors.push(ctor(public, &[]));
    obj.methods.push(method("toString", public, string(), &[]));
    obj.methods.push(method("equals", public, TypeRef::boolean(), &[object()]));
    obj.methods.push(method("hashCode", public, TypeRef::int(), &[]));
    obj.methods.push(method(
        "getClass",
        public | Modifiers::FINAL,
        TypeRef::class(names::CLASS),
        &[],
    ));
    obj.methods
        .push(method("clone", Modifiers::PROTECTED, object(), &[]));
    out.push(obj);

    out.push(stub(names::STRING, ClassKind::Class, public | Modifiers::FINAL, Some(names::OBJECT)));
    out.push(stub(names::CLASS, ClassKind::Class, public | Modifiers::FINAL, Some(names::OBJECT)));
    out.push(stub("java.lang.Number", ClassKind::Class, abstract_, Some(names::OBJECT)));
    for wrapper in ["java.lang.Integer", "java.lang.Long", "java.lang.Double", "java.lang.Float", "java.lang.Short", "java.lang.Byte"] {
        out.push(stub(wrapper, ClassKind::Class, public | Modifiers::FINAL, Some("java.lang.Number")));
    }
    out.push(stub("java.lang.Boolean", ClassKind::Class, public | Modifiers::FINAL, Some(names::OBJECT)));
    out.push(stub("java.lang.Character", ClassKind::Class, public | Modifiers::FINAL, Some(names::OBJECT)));

    let mut comparable = interface("java.lang.Comparable");
    comparable.generics.push(GenericParam {
        name: "T".into(),
        bound: object(),
    });
    comparable.methods.push(method(
        "compareTo",
        abstract_,
        TypeRef::int(),
        &[TypeRef::placeholder("T", object())],
    ));
    out.push(comparable);
    out.push(interface(names::CLONEABLE));
    out.push(interface("java.io.Serializable"));
    let mut runnable = interface("java.lang.Runnable");
    runnable
        .methods
        .push(method("run", abstract_, TypeRef::void(), &[]));
    out.push(runnable);

    let mut throwable = stub(names::THROWABLE, ClassKind::Class, public, Some(names::OBJECT));
    throwable.constructors.push(ctor(public, &[]));
    throwable.constructors.push(ctor(public, &[string()]));
    throwable
        .methods
        .push(method("getMessage", public, string(), &[]));
    out.push(throwable);
    for (name, parent) in [
        ("java.lang.Exception", names::THROWABLE),
        ("java.lang.RuntimeException", "java.lang.Exception"),
        ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
    ] {
        let mut class = stub(name, ClassKind::Class, public, Some(parent));
        class.constructors.push(ctor(public, &[]));
        class.constructors.push(ctor(public, &[string()]));
        out.push(class);
    }

    let mut enum_ = stub(names::ENUM, ClassKind::Class, abstract_, Some(names::OBJECT));
    enum_.interfaces.push(TypeRef::class("java.lang.Comparable"));
    enum_.interfaces.push(TypeRef::class("java.io.Serializable"));
    enum_
        .constructors
        .push(ctor(Modifiers::PROTECTED, &[string(), TypeRef::int()]));
    enum_
        .methods
        .push(method("name", public | Modifiers::FINAL, string(), &[]));
    enum_
        .methods
        .push(method("ordinal", public | Modifiers::FINAL, TypeRef::int(), &[]));
    enum_.methods.push(method(
        "compareTo",
        public | Modifiers::FINAL,
        TypeRef::int(),
        &[TypeRef::class(names::ENUM)],
    ));
    enum_.methods.push(method(
        "compareTo",
        public | Modifiers::SYNTHETIC | Modifiers::BRIDGE,
        TypeRef::int(),
        &[object()],
    ));
    enum_.methods.push(method(
        "valueOf",
        public | Modifiers::STATIC,
        TypeRef::class(names::ENUM),
        &[TypeRef::class(names::CLASS), string()],
    ));
    out.push(enum_);

    out.push(interface("java.util.Collection"));
    let mut list = interface(names::LIST);
    list.interfaces.push(TypeRef::class("java.util.Collection"));
    out.push(list);
    out.push(interface(names::MAP));
    let mut iterator = interface(names::ITERATOR);
    iterator
        .methods
        .push(method("hasNext", abstract_, TypeRef::boolean(), &[]));
    iterator.methods.push(method("next", abstract_, object(), &[]));
    out.push(iterator);

    out.push(interface(names::META_CLASS));
    let meta_class = || TypeRef::class(names::META_CLASS);
    let mut groovy_object = interface(names::GROOVY_OBJECT);
    groovy_object.methods = vec![
        method("getMetaClass", abstract_, meta_class(), &[]),
        method("setMetaClass", abstract_, TypeRef::void(), &[meta_class()]),
        method("invokeMethod", abstract_, object(), &[string(), object()]),
        method("getProperty", abstract_, object(), &[string()]),
        method("setProperty", abstract_, TypeRef::void(), &[string(), object()]),
    ];
    out.push(groovy_object);

    let mut support = stub(names::GROOVY_OBJECT_SUPPORT, ClassKind::Class, abstract_, Some(names::OBJECT));
    support.interfaces.push(TypeRef::class(names::GROOVY_OBJECT));
    support.constructors.push(ctor(public, &[]));
    support.methods = vec![
        method("getMetaClass", public, meta_class(), &[]),
        method("setMetaClass", public, TypeRef::void(), &[meta_class()]),
        method("invokeMethod", public, object(), &[string(), object()]),
        method("getProperty", public, object(), &[string()]),
        method("setProperty", public, TypeRef::void(), &[string(), object()]),
    ];
    out.push(support);

    let mut closure = stub(names::CLOSURE, ClassKind::Class, abstract_, Some(names::GROOVY_OBJECT_SUPPORT));
    closure.constructors.push(ctor(public, &[object(), object()]));
    closure.constructors.push(ctor(public, &[object()]));
    closure
        .methods
        .push(method("getThisObject", public, object(), &[]));
    closure.methods.push(method("getOwner", public, object(), &[]));
    out.push(closure);

    let mut reference = stub(names::REFERENCE, ClassKind::Class, public, Some(names::GROOVY_OBJECT_SUPPORT));
    reference.constructors.push(ctor(public, &[]));
    reference.constructors.push(ctor(public, &[object()]));
    reference.methods.push(method("get", public, object(), &[]));
    reference
        .methods
        .push(method("set", public, TypeRef::void(), &[object()]));
    out.push(reference);

    out.push(stub(names::GSTRING, ClassKind::Class, abstract_, Some(names::GROOVY_OBJECT_SUPPORT)));

    let mut annotation = interface(names::ANNOTATION);
    annotation
        .methods
        .push(method("annotationType", abstract_, TypeRef::class(names::CLASS), &[]));
    out.push(annotation);
    out.push(enum_stub(names::RETENTION_POLICY, &["SOURCE", "CLASS", "RUNTIME"]));
    out.push(enum_stub(
        "java.lang.annotation.ElementType",
        &[
            "TYPE",
            "FIELD",
            "METHOD",
            "PARAMETER",
            "CONSTRUCTOR",
            "LOCAL_VARIABLE",
            "ANNOTATION_TYPE",
            "PACKAGE",
        ],
    ));

    let mut retention = annotation_type(
        names::RETENTION,
        vec![method("value", abstract_, TypeRef::class(names::RETENTION_POLICY), &[])],
    );
    retention.annotations.push(runtime_retention(b));
    out.push(retention);

    let mut target = annotation_type(
        "java.lang.annotation.Target",
        vec![method(
            "value",
            abstract_,
            TypeRef::array(TypeRef::class("java.lang.annotation.ElementType")),
            &[],
        )],
    );
    target.annotations.push(runtime_retention(b));
    out.push(target);

    let mut deprecated = annotation_type("java.lang.Deprecated", Vec::new());
    deprecated.annotations.push(runtime_retention(b));
    out.push(deprecated);

    out
}

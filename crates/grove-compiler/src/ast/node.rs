//! Class-level AST nodes

use super::types::{internal_name, method_descriptor, package_of};
use super::{ClassId, Expr, Modifiers, NodeId, ScopeId, SourcePos, Stmt, TypeRef, VarId};

/// What kind of type a class node declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

/// Generic type parameter declaration
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: String,
    pub bound: TypeRef,
}

/// Annotation use (`@Foo(a = 1)`)
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    pub id: NodeId,
    pub ty: TypeRef,
    /// Attribute name → value expression, in source order
    pub members: Vec<(String, Expr)>,
    pub pos: SourcePos,
}

impl AnnotationNode {
    pub fn member(&self, name: &str) -> Option<&Expr> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, value)| value)
    }
}

/// Method or constructor parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    /// Default value; moved into the side tables by default-parameter expansion
    pub default: Option<Expr>,
    /// Set by the scope resolver
    pub var: Option<VarId>,
    pub annotations: Vec<AnnotationNode>,
    pub pos: SourcePos,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers: Modifiers::NONE,
            default: None,
            var: None,
            annotations: Vec::new(),
            pos: SourcePos::default(),
        }
    }

    pub fn with_default(mut self, default: Expr) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    /// Initializer; for enum constants a `List` of constructor arguments
    pub initial: Option<Expr>,
    pub annotations: Vec<AnnotationNode>,
    pub pos: SourcePos,
    /// Class body of an enum constant
    pub enum_body: Option<ClassId>,
}

impl FieldNode {
    pub fn new(name: impl Into<String>, ty: TypeRef, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers,
            initial: None,
            annotations: Vec::new(),
            pos: SourcePos::default(),
            enum_body: None,
        }
    }

    pub fn with_initial(mut self, initial: Expr) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn is_enum_constant(&self) -> bool {
        self.modifiers.contains(Modifiers::ENUM)
    }
}

/// A property owns the field of the same name
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyNode {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    /// User-supplied getter block
    pub getter: Option<Stmt>,
    /// User-supplied setter block (the value is bound to `value`)
    pub setter: Option<Stmt>,
    pub pos: SourcePos,
}

impl PropertyNode {
    /// Capitalized name used in accessor names
    pub fn capitalized(&self) -> String {
        capitalize(&self.name)
    }

    pub fn getter_name(&self) -> String {
        format!("get{}", self.capitalized())
    }

    pub fn setter_name(&self) -> String {
        format!("set{}", self.capitalized())
    }
}

/// `foo` → `Foo`
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Methods and constructors (`<init>`) alike
#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub name: String,
    pub modifiers: Modifiers,
    pub params: Vec<Parameter>,
    pub return_type: TypeRef,
    pub exceptions: Vec<TypeRef>,
    /// `None` for abstract and native methods
    pub body: Option<Stmt>,
    pub annotations: Vec<AnnotationNode>,
    pub generics: Vec<GenericParam>,
    /// Default value of an annotation-type member
    pub annotation_default: Option<Expr>,
    /// Method scope, set by the scope resolver
    pub scope: Option<ScopeId>,
    pub pos: SourcePos,
}

impl MethodNode {
    pub fn new(name: impl Into<String>, modifiers: Modifiers, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            modifiers,
            params: Vec::new(),
            return_type,
            exceptions: Vec::new(),
            body: None,
            annotations: Vec::new(),
            generics: Vec::new(),
            annotation_default: None,
            scope: None,
            pos: SourcePos::default(),
        }
    }

    pub fn constructor(modifiers: Modifiers) -> Self {
        Self::new("<init>", modifiers, TypeRef::void())
    }

    pub fn with_params(mut self, params: Vec<Parameter>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Stmt) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_init(&self) -> bool {
        self.name == "<clinit>"
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_void()
    }

    pub fn has_default_value(&self) -> bool {
        self.params.iter().any(|p| p.default.is_some())
    }

    pub fn erased_params(&self) -> Vec<TypeRef> {
        self.params.iter().map(|p| p.ty.erasure()).collect()
    }

    /// JVM method descriptor (erased)
    pub fn descriptor(&self) -> String {
        let params = self.erased_params();
        method_descriptor(&params, &self.return_type.erasure())
    }

    /// Name plus erased parameter descriptors; duplicate-signature key
    pub fn signature_key(&self) -> String {
        let desc = self.descriptor();
        let params_end = desc.find(')').map(|i| i + 1).unwrap_or(desc.len());
        format!("{}{}", self.name, &desc[..params_end])
    }

    /// Readable form: `java.lang.Object foo(int, java.lang.String)`
    pub fn type_descriptor(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.display_name()).collect();
        format!(
            "{} {}({})",
            self.return_type.display_name(),
            self.name,
            params.join(", ")
        )
    }

    /// Same name and erased parameter types
    pub fn same_signature(&self, name: &str, params: &[TypeRef]) -> bool {
        self.name == name
            && self.params.len() == params.len()
            && self
                .params
                .iter()
                .zip(params)
                .all(|(p, t)| p.ty.erasure() == t.erasure())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub id: ClassId,
    /// Dotted binary name (`p.Outer$Inner`)
    pub name: String,
    pub kind: ClassKind,
    pub modifiers: Modifiers,
    /// `None` only for `java.lang.Object`
    pub super_class: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub generics: Vec<GenericParam>,
    pub fields: Vec<FieldNode>,
    pub properties: Vec<PropertyNode>,
    pub methods: Vec<MethodNode>,
    pub constructors: Vec<MethodNode>,
    /// `{ ... }` instance initializer blocks
    pub object_initializers: Vec<Stmt>,
    /// `static { ... }` blocks
    pub static_initializers: Vec<Stmt>,
    pub annotations: Vec<AnnotationNode>,
    pub outer: Option<ClassId>,
    pub inner_classes: Vec<ClassId>,
    pub anonymous: bool,
    /// Compiled in this unit (as opposed to a library stub)
    pub is_primary: bool,
    /// Anonymous class instantiated from a static context
    pub static_context: bool,
    /// Enclosing-method locals an anonymous class captures
    pub captured: Vec<VarId>,
    pub source_file: Option<String>,
    pub pos: SourcePos,
}

impl ClassNode {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        let super_class = match kind {
            ClassKind::Enum => TypeRef::class(super::names::ENUM),
            _ => TypeRef::object(),
        };
        let mut modifiers = Modifiers::PUBLIC;
        match kind {
            ClassKind::Interface => modifiers |= Modifiers::INTERFACE | Modifiers::ABSTRACT,
            ClassKind::Annotation => {
                modifiers |= Modifiers::INTERFACE | Modifiers::ABSTRACT | Modifiers::ANNOTATION
            }
            ClassKind::Enum => modifiers |= Modifiers::ENUM,
            ClassKind::Class => {}
        }
        Self {
            id: ClassId(u32::MAX),
            name: name.into(),
            kind,
            modifiers,
            super_class: Some(super_class),
            interfaces: Vec::new(),
            generics: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            object_initializers: Vec::new(),
            static_initializers: Vec::new(),
            annotations: Vec::new(),
            outer: None,
            inner_classes: Vec::new(),
            anonymous: false,
            is_primary: true,
            static_context: false,
            captured: Vec::new(),
            source_file: None,
            pos: SourcePos::default(),
        }
    }

    pub fn with_super(mut self, super_class: TypeRef) -> Self {
        self.super_class = Some(super_class);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn type_ref(&self) -> TypeRef {
        TypeRef::class(self.name.clone())
    }

    pub fn internal_name(&self) -> String {
        internal_name(&self.name)
    }

    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_class.as_ref().and_then(|s| s.class_name())
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface | ClassKind::Annotation)
    }

    pub fn is_enum(&self) -> bool {
        self.kind == ClassKind::Enum
    }

    pub fn is_annotation(&self) -> bool {
        self.kind == ClassKind::Annotation
    }

    pub fn is_record(&self) -> bool {
        self.modifiers.contains(Modifiers::RECORD)
    }

    /// Non-static member class that needs an enclosing instance; enum
    /// constant bodies never do
    pub fn needs_outer_instance(&self) -> bool {
        self.outer.is_some()
            && self.kind == ClassKind::Class
            && !self.modifiers.is_static()
            && !self.modifiers.contains(Modifiers::ENUM)
            && !self.static_context
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldNode> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyNode> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodNode> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Declared method with the given name and erased parameter types
    pub fn declared_method(&self, name: &str, params: &[TypeRef]) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.same_signature(name, params))
    }

    pub fn declared_constructor(&self, params: &[TypeRef]) -> Option<&MethodNode> {
        self.constructors
            .iter()
            .find(|c| c.same_signature("<init>", params))
    }

    pub fn has_method(&self, name: &str, arity: usize) -> bool {
        self.methods
            .iter()
            .any(|m| m.name == name && m.params.len() == arity)
    }

    /// Add a field together with a property of the same name
    pub fn add_property(&mut self, name: impl Into<String>, ty: TypeRef, modifiers: Modifiers) {
        let name = name.into();
        let field_modifiers = Modifiers::PRIVATE
            | (modifiers.without(Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE));
        self.fields
            .push(FieldNode::new(name.clone(), ty.clone(), field_modifiers));
        self.properties.push(PropertyNode {
            name,
            ty,
            modifiers,
            getter: None,
            setter: None,
            pos: SourcePos::default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_key_ignores_return_type() {
        let a = MethodNode::new("m", Modifiers::PUBLIC, TypeRef::int())
            .with_params(vec![Parameter::new("x", TypeRef::string())]);
        let b = MethodNode::new("m", Modifiers::PUBLIC, TypeRef::object())
            .with_params(vec![Parameter::new("y", TypeRef::string())]);
        assert_eq!(a.signature_key(), "m(Ljava/lang/String;)");
        assert_eq!(a.signature_key(), b.signature_key());
        assert_eq!(a.type_descriptor(), "int m(java.lang.String)");
    }

    #[test]
    fn test_add_property_creates_private_field() {
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.add_property("name", TypeRef::string(), Modifiers::PUBLIC);
        assert!(class.field("name").unwrap().modifiers.is_private());
        assert_eq!(class.property("name").unwrap().getter_name(), "getName");
    }

    #[test]
    fn test_enum_defaults() {
        let class = ClassNode::new("p.Color", ClassKind::Enum);
        assert_eq!(class.super_name(), Some("java.lang.Enum"));
        assert!(class.modifiers.contains(Modifiers::ENUM));
    }
}

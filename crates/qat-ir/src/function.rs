//! Functions, basic blocks, globals and attributes.

use std::fmt;

use crate::types::{FunctionType, Type};
use crate::value::{BlockId, InstrId, Value};

/// A function attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Keyword attribute such as `nounwind`.
    Keyword(String),
    /// String attribute such as `"EntryPoint"` or `"requiredQubits"="3"`.
    String {
        /// Attribute key.
        key: String,
        /// Optional value.
        value: Option<String>,
    },
}

impl Attribute {
    /// String attribute without a value.
    pub fn flag(key: impl Into<String>) -> Self {
        Attribute::String {
            key: key.into(),
            value: None,
        }
    }

    /// String attribute with a value.
    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute::String {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Key of a string attribute or the keyword itself.
    pub fn key(&self) -> &str {
        match self {
            Attribute::Keyword(k) | Attribute::String { key: k, .. } => k,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Keyword(k) => write!(f, "{k}"),
            Attribute::String { key, value: None } => write!(f, "\"{key}\""),
            Attribute::String {
                key,
                value: Some(value),
            } => write!(f, "\"{key}\"=\"{value}\""),
        }
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name, `None` if unnamed.
    pub name: Option<String>,
    /// Parameter type.
    pub ty: Type,
}

/// A function definition or declaration.
#[derive(Debug, Clone)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) ret: Type,
    pub(crate) params: Vec<Param>,
    pub(crate) var_arg: bool,
    pub(crate) linkage: Option<String>,
    pub(crate) unnamed_addr: Option<String>,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) erased: bool,
}

impl Function {
    pub(crate) fn new(name: String, signature: FunctionType, param_names: Vec<Option<String>>) -> Self {
        let mut names = param_names.into_iter();
        let params = signature
            .params
            .into_iter()
            .map(|ty| Param {
                name: names.next().flatten(),
                ty,
            })
            .collect();
        Self {
            name,
            ret: signature.ret,
            params,
            var_arg: signature.var_arg,
            linkage: None,
            unnamed_addr: None,
            attributes: Vec::new(),
            blocks: Vec::new(),
            erased: false,
        }
    }

    /// Function name without the `@` sigil.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return type.
    pub fn return_type(&self) -> &Type {
        &self.ret
    }

    /// Formal parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The function signature.
    pub fn signature(&self) -> FunctionType {
        FunctionType {
            ret: self.ret.clone(),
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            var_arg: self.var_arg,
        }
    }

    /// Check whether the function is variadic.
    pub fn is_var_arg(&self) -> bool {
        self.var_arg
    }

    /// Check whether this is a declaration without a body.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in layout order. The first block is the entry block.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// The entry block of a definition.
    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    /// Linkage keyword such as `internal`.
    pub fn linkage(&self) -> Option<&str> {
        self.linkage.as_deref()
    }

    /// Set the linkage keyword.
    pub fn set_linkage(&mut self, linkage: Option<String>) {
        self.linkage = linkage;
    }

    /// `unnamed_addr` or `local_unnamed_addr` marker.
    pub fn unnamed_addr(&self) -> Option<&str> {
        self.unnamed_addr.as_deref()
    }

    /// Set the `unnamed_addr` marker.
    pub fn set_unnamed_addr(&mut self, marker: Option<String>) {
        self.unnamed_addr = marker;
    }

    /// All attributes.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Check whether an attribute with the given key is present.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.iter().any(|a| a.key() == key)
    }

    /// Value of a string attribute.
    pub fn attribute_value(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::String {
                key: k,
                value: Some(v),
            } if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Add an attribute, replacing any existing attribute with the same key.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.retain(|a| a.key() != attribute.key());
        self.attributes.push(attribute);
    }

    /// Check whether the function has been erased.
    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<crate::FuncId>,
    pub(crate) instructions: Vec<InstrId>,
    pub(crate) erased: bool,
}

impl BasicBlock {
    /// Label, `None` if unnamed.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning function.
    pub fn parent(&self) -> Option<crate::FuncId> {
        self.parent
    }

    /// Instructions in order.
    pub fn instructions(&self) -> &[InstrId] {
        &self.instructions
    }

    /// The final instruction, normally the terminator.
    pub fn terminator(&self) -> Option<InstrId> {
        self.instructions.last().copied()
    }

    /// Check whether the block has been erased.
    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

/// A global variable.
#[derive(Debug, Clone)]
pub struct Global {
    pub(crate) name: String,
    pub(crate) ty: Type,
    pub(crate) linkage: Option<String>,
    pub(crate) unnamed_addr: Option<String>,
    pub(crate) constant: bool,
    pub(crate) initializer: Option<Value>,
    pub(crate) align: Option<u32>,
    pub(crate) erased: bool,
}

impl Global {
    /// Create a global of the given value type.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage: None,
            unnamed_addr: None,
            constant: false,
            initializer: None,
            align: None,
            erased: false,
        }
    }

    /// Set the linkage keyword.
    #[must_use]
    pub fn with_linkage(mut self, linkage: impl Into<String>) -> Self {
        self.linkage = Some(linkage.into());
        self
    }

    /// Set the `unnamed_addr` marker.
    #[must_use]
    pub fn with_unnamed_addr(mut self, marker: impl Into<String>) -> Self {
        self.unnamed_addr = Some(marker.into());
        self
    }

    /// Mark the global as `constant` instead of `global`.
    #[must_use]
    pub fn with_constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    /// Set the initializer.
    #[must_use]
    pub fn with_initializer(mut self, initializer: Value) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Set the alignment.
    #[must_use]
    pub fn with_align(mut self, align: u32) -> Self {
        self.align = Some(align);
        self
    }

    /// Name without the `@` sigil.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the stored value. The global itself is a pointer to this.
    pub fn value_type(&self) -> &Type {
        &self.ty
    }

    /// Linkage keyword.
    pub fn linkage(&self) -> Option<&str> {
        self.linkage.as_deref()
    }

    /// `unnamed_addr` marker.
    pub fn unnamed_addr(&self) -> Option<&str> {
        self.unnamed_addr.as_deref()
    }

    /// Check whether the global is `constant`.
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// The initializer.
    pub fn initializer(&self) -> Option<&Value> {
        self.initializer.as_ref()
    }

    /// Alignment.
    pub fn align(&self) -> Option<u32> {
        self.align
    }

    /// Check whether the global has been erased.
    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

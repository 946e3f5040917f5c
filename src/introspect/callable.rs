//! Callable descriptors
//!
//! `CallableInfo` describes any signature (functions and callback types),
//! `FunctionInfo` adds what is needed to actually reach a native entry point.

use std::fmt;
use std::sync::Arc;

use super::dispatch::DispatchTable;
use super::types::{Direction, ScopeType, Transfer, TypeInfo};
use crate::interop::{Library, SymbolError};

/// Address of a native entry point
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAddress(usize);

impl NativeAddress {
    #[inline]
    pub fn from_ptr(ptr: *const ()) -> Self {
        Self(ptr as usize)
    }

    #[inline]
    pub fn as_ptr(self) -> *const () {
        self.0 as *const ()
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeAddress({:#x})", self.0)
    }
}

/// Formal parameter metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ArgInfo {
    pub name: String,
    pub ty: TypeInfo,
    pub direction: Direction,
    pub transfer: Transfer,
    pub may_be_null: bool,
    pub caller_allocates: bool,
    /// For callback parameters: index of the user-data parameter
    pub closure: Option<usize>,
    /// For callback parameters: index of the destroy-notifier parameter
    pub destroy: Option<usize>,
    pub scope: ScopeType,
}

impl ArgInfo {
    pub fn new(name: impl Into<String>, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: Direction::In,
            transfer: Transfer::Nothing,
            may_be_null: false,
            caller_allocates: false,
            closure: None,
            destroy: None,
            scope: ScopeType::Call,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn out(self) -> Self {
        self.direction(Direction::Out)
    }

    pub fn inout(self) -> Self {
        self.direction(Direction::InOut)
    }

    pub fn transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.may_be_null = true;
        self
    }

    pub fn caller_allocates(mut self) -> Self {
        self.caller_allocates = true;
        self
    }

    pub fn closure(mut self, index: usize) -> Self {
        self.closure = Some(index);
        self
    }

    pub fn destroy(mut self, index: usize) -> Self {
        self.destroy = Some(index);
        self
    }

    pub fn scope(mut self, scope: ScopeType) -> Self {
        self.scope = scope;
        self
    }
}

/// Signature metadata shared by functions, virtual functions and callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct CallableInfo {
    pub namespace: String,
    pub name: String,
    pub args: Vec<ArgInfo>,
    pub return_type: TypeInfo,
    pub return_transfer: Transfer,
    pub skip_return: bool,
    pub may_return_null: bool,
    pub can_throw: bool,
}

impl CallableInfo {
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> CallableBuilder {
        CallableBuilder {
            info: CallableInfo {
                namespace: namespace.into(),
                name: name.into(),
                args: Vec::new(),
                return_type: TypeInfo::Void,
                return_transfer: Transfer::Nothing,
                skip_return: false,
                may_return_null: false,
                can_throw: false,
            },
        }
    }

    #[inline]
    pub fn n_args(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn arg(&self, index: usize) -> Option<&ArgInfo> {
        self.args.get(index)
    }

    /// Return value is absent from the caller's point of view
    #[inline]
    pub fn skips_return(&self) -> bool {
        self.return_type.is_void() || self.skip_return
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Builder for [`CallableInfo`]
#[derive(Debug, Clone)]
pub struct CallableBuilder {
    info: CallableInfo,
}

impl CallableBuilder {
    pub fn arg(mut self, arg: ArgInfo) -> Self {
        self.info.args.push(arg);
        self
    }

    pub fn returns(mut self, ty: TypeInfo) -> Self {
        self.info.return_type = ty;
        self
    }

    pub fn return_transfer(mut self, transfer: Transfer) -> Self {
        self.info.return_transfer = transfer;
        self
    }

    pub fn skip_return(mut self) -> Self {
        self.info.skip_return = true;
        self
    }

    pub fn may_return_null(mut self) -> Self {
        self.info.may_return_null = true;
        self
    }

    pub fn throws(mut self) -> Self {
        self.info.can_throw = true;
        self
    }

    pub fn build(self) -> CallableInfo {
        self.info
    }
}

/// How a function's native address is found
#[derive(Debug, Clone)]
pub enum EntryPoint {
    /// Already resolved
    Address(NativeAddress),
    /// Exported symbol of a loaded library
    Symbol(Arc<Library>),
    /// Only reachable through an implementor's dispatch table
    Virtual,
}

/// Function descriptor: a callable plus its entry point
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    callable: CallableInfo,
    symbol: String,
    is_method: bool,
    is_constructor: bool,
    container: Option<TypeInfo>,
    entry: EntryPoint,
}

/// Descriptor handle retained by the engine
pub type FunctionDescriptor = Arc<FunctionInfo>;

impl FunctionInfo {
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> FunctionBuilder {
        let callable = CallableInfo::builder(namespace, name);
        let symbol = callable.info.name.clone();
        FunctionBuilder {
            callable,
            symbol,
            is_method: false,
            is_constructor: false,
            container: None,
            entry: EntryPoint::Virtual,
        }
    }

    #[inline]
    pub fn callable(&self) -> &CallableInfo {
        &self.callable
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.callable.name
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn n_args(&self) -> usize {
        self.callable.n_args()
    }

    #[inline]
    pub fn arg(&self, index: usize) -> Option<&ArgInfo> {
        self.callable.arg(index)
    }

    #[inline]
    pub fn args(&self) -> &[ArgInfo] {
        &self.callable.args
    }

    #[inline]
    pub fn return_type(&self) -> &TypeInfo {
        &self.callable.return_type
    }

    #[inline]
    pub fn return_transfer(&self) -> Transfer {
        self.callable.return_transfer
    }

    #[inline]
    pub fn skips_return(&self) -> bool {
        self.callable.skips_return()
    }

    #[inline]
    pub fn can_throw(&self) -> bool {
        self.callable.can_throw
    }

    /// Takes an instance receiver; constructors never do
    #[inline]
    pub fn is_method(&self) -> bool {
        self.is_method && !self.is_constructor
    }

    /// Type used to convert the receiver
    pub fn container(&self) -> &TypeInfo {
        static OPAQUE: TypeInfo = TypeInfo::Pointer;
        self.container.as_ref().unwrap_or(&OPAQUE)
    }

    #[inline]
    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Resolve the fixed native entry point
    pub fn entry_address(&self) -> Result<NativeAddress, SymbolError> {
        match &self.entry {
            EntryPoint::Address(address) if address.is_null() => Err(SymbolError::NotFound(self.symbol.clone())),
            EntryPoint::Address(address) => Ok(*address),
            EntryPoint::Symbol(library) => library.symbol(&self.symbol),
            EntryPoint::Virtual => Err(SymbolError::NotFound(self.symbol.clone())),
        }
    }

    /// Resolve through an implementor's dispatch table
    pub fn virtual_address(&self, implementor: &DispatchTable) -> Result<NativeAddress, String> {
        implementor.resolve(self.name()).ok_or_else(|| {
            format!(
                "no implementation of '{}' in the dispatch table of {}",
                self.name(),
                implementor.type_name()
            )
        })
    }
}

/// Builder for [`FunctionInfo`]
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    callable: CallableBuilder,
    symbol: String,
    is_method: bool,
    is_constructor: bool,
    container: Option<TypeInfo>,
    entry: EntryPoint,
}

impl FunctionBuilder {
    pub fn arg(mut self, arg: ArgInfo) -> Self {
        self.callable = self.callable.arg(arg);
        self
    }

    pub fn returns(mut self, ty: TypeInfo) -> Self {
        self.callable = self.callable.returns(ty);
        self
    }

    pub fn return_transfer(mut self, transfer: Transfer) -> Self {
        self.callable = self.callable.return_transfer(transfer);
        self
    }

    pub fn skip_return(mut self) -> Self {
        self.callable = self.callable.skip_return();
        self
    }

    pub fn throws(mut self) -> Self {
        self.callable = self.callable.throws();
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Instance method whose receiver converts with `container`
    pub fn method(mut self, container: TypeInfo) -> Self {
        self.is_method = true;
        self.container = Some(container);
        self
    }

    pub fn constructor(mut self) -> Self {
        self.is_constructor = true;
        self
    }

    pub fn address(mut self, address: NativeAddress) -> Self {
        self.entry = EntryPoint::Address(address);
        self
    }

    pub fn library(mut self, library: Arc<Library>) -> Self {
        self.entry = EntryPoint::Symbol(library);
        self
    }

    pub fn build(self) -> FunctionDescriptor {
        Arc::new(FunctionInfo {
            callable: self.callable.build(),
            symbol: self.symbol,
            is_method: self.is_method,
            is_constructor: self.is_constructor,
            container: self.container,
            entry: self.entry,
        })
    }
}

//! Structured (boxed) memory
//!
//! Boxed memory lives on the C heap (`calloc`/`free`) so native code may
//! take ownership of it, or hand its own allocations over.

use core::ffi::c_void;
use core::ptr::NonNull;
use std::sync::Arc;

use super::stats;
use crate::introspect::{StructInfo, TypeInfo};
use crate::logging::{log_allocation, log_deallocation};

/// Size in bytes of a value of `ty` stored inline
pub fn size_of(ty: &TypeInfo) -> usize {
    match ty {
        TypeInfo::Struct(info) => info.size,
        other => other.ffi_type().size(),
    }
}

/// Owned zeroed block on the C heap, released when dropped
pub struct BoxedAllocation {
    ptr: NonNull<u8>,
    size: usize,
}

// The allocation is plain memory exclusively owned by this handle.
unsafe impl Send for BoxedAllocation {}
unsafe impl Sync for BoxedAllocation {}

impl BoxedAllocation {
    /// Allocate `size` zeroed bytes (at least one)
    pub fn zeroed(size: usize) -> Option<Self> {
        let ptr = unsafe { libc::calloc(1, size.max(1)) } as *mut u8;
        let ptr = NonNull::new(ptr)?;
        stats::record_allocation();
        log_allocation(size, ptr.as_ptr());
        Some(Self { ptr, size })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy `size` bytes from native memory into a new allocation
    ///
    /// # Safety
    /// `src` must be readable for `size` bytes
    pub unsafe fn copy_from(src: *const c_void, size: usize) -> Option<Self> {
        let block = Self::zeroed(size)?;
        core::ptr::copy_nonoverlapping(src.cast::<u8>(), block.ptr.as_ptr(), size);
        Some(block)
    }
}

impl Drop for BoxedAllocation {
    fn drop(&mut self) {
        log_deallocation(self.ptr.as_ptr());
        stats::record_release();
        unsafe { libc::free(self.ptr.as_ptr().cast()) }
    }
}

impl core::fmt::Debug for BoxedAllocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BoxedAllocation({:p}, {} bytes)", self.ptr, self.size)
    }
}

/// Caller-side handle to a structure instance
///
/// Either owns its memory (released with the last clone) or borrows memory
/// owned by native code.
#[derive(Clone)]
pub struct Boxed {
    info: Arc<StructInfo>,
    ptr: NonNull<c_void>,
    owner: Option<Arc<BoxedAllocation>>,
}

// Owned memory is reference counted; borrowed memory is the native side's concern.
unsafe impl Send for Boxed {}
unsafe impl Sync for Boxed {}

impl Boxed {
    /// New zeroed instance owned by the handle
    pub fn new(info: Arc<StructInfo>) -> Option<Self> {
        let block = BoxedAllocation::zeroed(info.size)?;
        Some(Self::from_allocation(info, block))
    }

    /// Take over an engine allocation
    pub fn from_allocation(info: Arc<StructInfo>, block: BoxedAllocation) -> Self {
        let ptr = NonNull::new(block.as_ptr()).unwrap_or(NonNull::dangling());
        Self {
            info,
            ptr,
            owner: Some(Arc::new(block)),
        }
    }

    /// Wrap memory owned elsewhere
    pub fn borrowed(info: Arc<StructInfo>, ptr: NonNull<c_void>) -> Self {
        Self { info, ptr, owner: None }
    }

    #[inline]
    pub fn info(&self) -> &Arc<StructInfo> {
        &self.info
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Read a field at `offset`
    ///
    /// # Safety
    /// A valid `T` must be stored at `offset`
    pub unsafe fn read<T: Copy>(&self, offset: usize) -> T {
        assert!(offset + core::mem::size_of::<T>() <= self.info.size, "field out of bounds");
        self.ptr.as_ptr().cast::<u8>().add(offset).cast::<T>().read_unaligned()
    }

    /// Write a field at `offset`
    ///
    /// # Safety
    /// Writing a `T` at `offset` must keep the structure valid
    pub unsafe fn write<T: Copy>(&self, offset: usize, value: T) {
        assert!(offset + core::mem::size_of::<T>() <= self.info.size, "field out of bounds");
        self.ptr.as_ptr().cast::<u8>().add(offset).cast::<T>().write_unaligned(value)
    }
}

impl PartialEq for Boxed {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl core::fmt::Debug for Boxed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Boxed<{}>({:p}{})", self.info.qualified_name(), self.ptr,
               if self.is_owned() { ", owned" } else { "" })
    }
}

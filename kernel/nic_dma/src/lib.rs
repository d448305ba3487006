//! Memory plumbing shared by NIC drivers: physically-contiguous DMA regions
//! with stable addresses, typed views over them, and typed views over the
//! device's memory-mapped register window.
//!
//! The driver operates in an identity-mapped environment, so the "physical"
//! address of a region is its virtual start address. An embedder that runs
//! behind a real virt-to-phys translation layer supplies its own region
//! constructor and keeps the rest of the driver unchanged.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::{fmt, mem, slice};

/// The size of one page, which every DMA region's start is aligned to.
pub const PAGE_SIZE: usize = 4096;

/// A physical address, as handed to the device in descriptors and
/// base-address registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(usize);

impl PhysicalAddress {
    pub fn new(value: usize) -> PhysicalAddress {
        PhysicalAddress(value)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "p{:#X}", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#X}", self.0)
    }
}

impl core::ops::Add<usize> for PhysicalAddress {
    type Output = PhysicalAddress;
    fn add(self, rhs: usize) -> PhysicalAddress {
        PhysicalAddress(self.0 + rhs)
    }
}

/// Types that may safely overlay device-shared memory.
///
/// # Safety
/// Implementors must guarantee that every bit pattern is a valid value of the
/// type, since the device (or a zeroed allocation) can produce any pattern.
pub unsafe trait FromDmaBytes {}

unsafe impl FromDmaBytes for u8 {}
unsafe impl FromDmaBytes for u16 {}
unsafe impl FromDmaBytes for u32 {}
unsafe impl FromDmaBytes for u64 {}
unsafe impl<T: FromDmaBytes, const N: usize> FromDmaBytes for [T; N] {}

/// One physically-contiguous, zeroed, page-aligned memory region that the
/// device may DMA into or out of. The region never moves or grows, so the
/// address handed to the device stays valid for the region's whole lifetime.
pub struct DmaRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The region is exclusively owned; the raw pointer is only an allocation.
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Allocates a new zeroed region of `size_in_bytes`, page-aligned.
    pub fn new(size_in_bytes: usize) -> Result<DmaRegion, &'static str> {
        if size_in_bytes == 0 {
            return Err("nic_dma: cannot create a zero-sized DMA region");
        }
        let layout = Layout::from_size_align(size_in_bytes, PAGE_SIZE)
            .map_err(|_| "nic_dma: invalid DMA region layout")?;
        // zeroed: rings and buffers must start in a known-clear state
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })
            .ok_or("nic_dma: out of memory for DMA region")?;
        Ok(DmaRegion { ptr, layout })
    }

    /// The address the device should use to access the start of this region.
    pub fn start_address(&self) -> PhysicalAddress {
        PhysicalAddress(self.ptr.as_ptr() as usize)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.layout.size()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Creates a contiguous DMA mapping of (at least) `size_in_bytes` and returns
/// it along with its starting physical address.
pub fn create_contiguous_mapping(
    size_in_bytes: usize,
) -> Result<(DmaRegion, PhysicalAddress), &'static str> {
    let region = DmaRegion::new(size_in_bytes)?;
    let start = region.start_address();
    log::trace!("nic_dma: mapped {} contiguous bytes at {}", size_in_bytes, start);
    Ok((region, start))
}

/// A fixed-length typed slice over an owned [`DmaRegion`], used for
/// descriptor rings. Auto-dereferences into `[T]`.
pub struct DmaSlice<T: FromDmaBytes> {
    region: DmaRegion,
    len: usize,
    _element: PhantomData<T>,
}

impl<T: FromDmaBytes> DmaSlice<T> {
    /// Allocates a zeroed region holding exactly `len` elements of `T`.
    pub fn new(len: usize) -> Result<DmaSlice<T>, &'static str> {
        let size_in_bytes = len
            .checked_mul(mem::size_of::<T>())
            .ok_or("nic_dma: DMA slice size overflow")?;
        let region = DmaRegion::new(size_in_bytes)?;
        // page alignment of the region covers any element alignment we use
        if region.start_address().value() % mem::align_of::<T>() != 0 {
            return Err("nic_dma: DMA region misaligned for element type");
        }
        Ok(DmaSlice { region, len, _element: PhantomData })
    }

    /// The physical address of element 0, i.e. what goes in the device's
    /// ring base-address registers.
    pub fn start_address(&self) -> PhysicalAddress {
        self.region.start_address()
    }

    /// Total size of the backing array in bytes, i.e. what goes in the
    /// device's ring length register.
    pub fn size_in_bytes(&self) -> usize {
        self.len * mem::size_of::<T>()
    }
}

impl<T: FromDmaBytes> Deref for DmaSlice<T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.region.ptr.as_ptr() as *const T, self.len) }
    }
}

impl<T: FromDmaBytes> DerefMut for DmaSlice<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.region.ptr.as_ptr() as *mut T, self.len) }
    }
}

/// A pool of `count` fixed-size packet buffers in one contiguous region.
///
/// Buffer `i` lives at `start + i * buffer_size` and is permanently bound to
/// ring slot `i`; the arena never reallocates, so the per-slot addresses
/// written into descriptors at ring init stay valid forever.
pub struct BufferArena {
    region: DmaRegion,
    buffer_size: usize,
    count: usize,
}

impl BufferArena {
    pub fn new(count: usize, buffer_size: usize) -> Result<BufferArena, &'static str> {
        if count == 0 || buffer_size == 0 {
            return Err("nic_dma: buffer arena dimensions must be non-zero");
        }
        let size_in_bytes = count
            .checked_mul(buffer_size)
            .ok_or("nic_dma: buffer arena size overflow")?;
        let region = DmaRegion::new(size_in_bytes)?;
        Ok(BufferArena { region, buffer_size, count })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The physical address of buffer `index`, written once into the
    /// matching descriptor at ring init.
    pub fn buffer_address(&self, index: usize) -> PhysicalAddress {
        self.region.start_address() + index * self.buffer_size
    }

    pub fn buffer(&self, index: usize) -> &[u8] {
        let offset = index * self.buffer_size;
        &self.region.as_slice()[offset..offset + self.buffer_size]
    }

    pub fn buffer_mut(&mut self, index: usize) -> &mut [u8] {
        let offset = index * self.buffer_size;
        &mut self.region.as_slice_mut()[offset..offset + self.buffer_size]
    }
}

/// An already-mapped device register window, as handed over by the bus layer
/// after PCI enumeration.
///
/// The window does not own its memory; see [`MappedWindow::new`] for the
/// mapping-lifetime contract.
pub struct MappedWindow {
    base: NonNull<u8>,
    size_in_bytes: usize,
}

unsafe impl Send for MappedWindow {}

impl MappedWindow {
    /// Wraps the register mapping starting at `base`.
    ///
    /// # Safety
    /// `base` must point to a live mapping of at least `size_in_bytes` bytes
    /// of device registers, and the mapping must remain valid for as long as
    /// this window and every view carved from it are in use.
    pub unsafe fn new(base: *mut u8, size_in_bytes: usize) -> Result<MappedWindow, &'static str> {
        let base = NonNull::new(base).ok_or("nic_dma: register window base is null")?;
        Ok(MappedWindow { base, size_in_bytes })
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Carves a typed register block view out of the window at `offset`.
    ///
    /// # Safety
    /// The caller must ensure that views carved from one window do not
    /// overlap, since each view hands out `&mut` access to its block.
    pub unsafe fn as_type_mut<T: FromDmaBytes>(
        &self,
        offset: usize,
    ) -> Result<MappedRegisters<T>, &'static str> {
        let end = offset
            .checked_add(mem::size_of::<T>())
            .ok_or("nic_dma: register block offset overflow")?;
        if end > self.size_in_bytes {
            return Err("nic_dma: register block extends past the mapped window");
        }
        let addr = self.base.as_ptr() as usize + offset;
        if addr % mem::align_of::<T>() != 0 {
            return Err("nic_dma: register block is misaligned");
        }
        // already checked non-null above, and offset keeps it non-null
        Ok(MappedRegisters { ptr: NonNull::new_unchecked(addr as *mut T) })
    }
}

/// A typed view over one block of device registers within a [`MappedWindow`].
/// Auto-dereferences into the register struct `T`.
pub struct MappedRegisters<T> {
    ptr: NonNull<T>,
}

unsafe impl<T: Send> Send for MappedRegisters<T> {}

impl<T> Deref for MappedRegisters<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for MappedRegisters<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

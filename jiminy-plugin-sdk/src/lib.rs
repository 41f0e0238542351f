//! jiminy-plugin-sdk: SDK for writing creator modules as Wasm plug-ins
//!
//! A module declares one or more classes and decides, per request, which
//! nodes end up in the instance set. The host owns the scene: it creates the
//! set and imprints the data from the returned plan.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jiminy_plugin_sdk::prelude::*;
//!
//! struct Rigs;
//!
//! impl CreatorModule for Rigs {
//!     fn manifest() -> ModuleManifest {
//!         ModuleManifest::new().class(ClassSpec::new("RigCreator", "Creator").family("rig"))
//!     }
//!
//!     fn process(request: ProcessRequest) -> ProcessResult {
//!         ProcessResult::create(request.selection)
//!     }
//! }
//!
//! export_module!(Rigs);
//! ```

use std::alloc::{alloc, dealloc, Layout};

pub use jiminy_plugin_api::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{export_module, memory, CreatorModule};
    pub use jiminy_plugin_api::{
        ClassSpec, DataMap, InstancePlan, ModuleManifest, ProcessError, ProcessRequest,
        ProcessResult, API_VERSION,
    };
}

/// Trait that creator modules implement
pub trait CreatorModule {
    /// Classes exported by this module
    fn manifest() -> ModuleManifest;

    /// Plan the instance for `request.class`
    fn process(request: ProcessRequest) -> ProcessResult;
}

/// Guest side of the host protocol
///
/// The host writes a MessagePack [`ProcessRequest`] into a buffer obtained
/// from `plugin_alloc` and calls `plugin_process`. Answers (the
/// [`ModuleManifest`] and every [`ProcessResult`]) travel back the same way:
/// MessagePack in a fresh buffer whose address and length are returned as
/// one `i64`, address in the high half. The host frees both buffers with
/// `plugin_dealloc` once it has copied them out.
pub mod memory {
    use super::*;

    fn layout(size: i32) -> Option<Layout> {
        let size = usize::try_from(size).ok().filter(|&size| size > 0)?;
        Layout::from_size_align(size, 1).ok()
    }

    /// Buffer of `size` bytes for the host; 0 when `size` is not positive
    #[inline]
    pub fn plugin_alloc(size: i32) -> i32 {
        match layout(size) {
            Some(layout) => unsafe { alloc(layout) as i32 },
            None => 0,
        }
    }

    /// Free a buffer from [`plugin_alloc`]; `size` must match
    #[inline]
    pub fn plugin_dealloc(ptr: i32, size: i32) {
        if ptr == 0 {
            return;
        }
        if let Some(layout) = layout(size) {
            unsafe { dealloc(ptr as *mut u8, layout) }
        }
    }

    /// Address and length of an answer buffer as the host unpacks them
    #[inline]
    pub fn pack_ptr_len(ptr: i32, len: i32) -> i64 {
        ((ptr as i64) << 32) | (len as u32 as i64)
    }

    /// Encode an answer for the host
    ///
    /// An answer that cannot be encoded goes back as an empty buffer, which
    /// the host reports as a decoding failure of this unit.
    pub fn write_message<T: serde::Serialize>(message: &T) -> i64 {
        let bytes = rmp_serde::to_vec(message).unwrap_or_default();
        let ptr = plugin_alloc(bytes.len() as i32);
        if ptr == 0 {
            return pack_ptr_len(0, 0);
        }

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        }
        pack_ptr_len(ptr, bytes.len() as i32)
    }

    /// Decode the request the host wrote at `ptr`
    ///
    /// # Safety
    /// `ptr..ptr + len` must be a buffer the host filled after `plugin_alloc`.
    pub unsafe fn read_message<T: serde::de::DeserializeOwned>(ptr: i32, len: i32) -> Option<T> {
        let len = usize::try_from(len).ok().filter(|&len| len > 0)?;
        if ptr == 0 {
            return None;
        }
        let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
        rmp_serde::from_slice(bytes).ok()
    }
}

/// Export `plugin_manifest`, `plugin_process`, `plugin_alloc` and
/// `plugin_dealloc` for a [`CreatorModule`]
#[macro_export]
macro_rules! export_module {
    ($module:ty) => {
        #[no_mangle]
        pub extern "C" fn plugin_manifest() -> i64 {
            let manifest = <$module as $crate::CreatorModule>::manifest();
            $crate::memory::write_message(&manifest)
        }

        #[no_mangle]
        pub extern "C" fn plugin_process(request_ptr: i32, request_len: i32) -> i64 {
            let request: Option<$crate::ProcessRequest> =
                unsafe { $crate::memory::read_message(request_ptr, request_len) };
            let result = match request {
                Some(request) => <$module as $crate::CreatorModule>::process(request),
                None => $crate::ProcessResult::error("malformed process request"),
            };
            $crate::memory::write_message(&result)
        }

        #[no_mangle]
        pub extern "C" fn plugin_alloc(size: i32) -> i32 {
            $crate::memory::plugin_alloc(size)
        }

        #[no_mangle]
        pub extern "C" fn plugin_dealloc(ptr: i32, size: i32) {
            $crate::memory::plugin_dealloc(ptr, size)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_address_in_high_half() {
        let packed = memory::pack_ptr_len(0x0010_0000, 42);

        assert_eq!((packed >> 32) as i32, 0x0010_0000);
        assert_eq!((packed & 0xFFFFFFFF) as i32, 42);
    }

    #[test]
    fn test_read_message_rejects_empty_buffers() {
        let request: Option<ProcessRequest> = unsafe { memory::read_message(0, 16) };
        assert!(request.is_none());

        let request: Option<ProcessRequest> = unsafe { memory::read_message(64, 0) };
        assert!(request.is_none());
    }

    #[test]
    fn test_alloc_rejects_empty_requests() {
        assert_eq!(memory::plugin_alloc(0), 0);
        assert_eq!(memory::plugin_alloc(-8), 0);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
#![no_std]

//! First-mover claiming of `&'static mut` backing storage for DMA buffers
//! and similar hardware-owned arrays that can't live on the stack.
//!
//! A given invocation site may run exactly once per task lifetime; a second
//! execution (which would imply two live `&mut` references to the same
//! memory) panics instead.

/// Claims one or more mutable static arrays, each initialized element-wise
/// by a supplied closure, and hands back `&'static mut` references to them
/// in declaration order.
#[macro_export]
macro_rules! mutable_statics {
    (
        $(
            $(#[$attr:meta])*
            static mut $name:ident: [$t:ty; $n:expr] = [$init:expr; _];
        )*
    ) => {{
        static CLAIMED: core::sync::atomic::AtomicBool =
            core::sync::atomic::AtomicBool::new(false);
        if CLAIMED.swap(true, core::sync::atomic::Ordering::Relaxed) {
            panic!("mutable_statics! claim site reached twice")
        }
        (
            $(
                {
                    $(#[$attr])*
                    static mut $name: core::mem::MaybeUninit<[$t; $n]> =
                        core::mem::MaybeUninit::uninit();
                    // Safety: CLAIMED's swap above guarantees this call site
                    // runs at most once, so this &mut cannot alias any other
                    // live reference to $name.
                    let storage = unsafe { &mut $name };
                    let storage: &'static mut [core::mem::MaybeUninit<$t>; $n] =
                        unsafe { &mut *(storage as *mut _ as *mut _) };
                    for slot in storage.iter_mut() {
                        *slot = core::mem::MaybeUninit::new($init());
                    }
                    // Safety: every slot was just initialized above.
                    let storage: &'static mut [$t; $n] =
                        unsafe { &mut *(storage as *mut _ as *mut _) };
                    storage
                }
            ),*
        )
    }};
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Declares a named placeholder for a peer task's identity, resolved by the
/// build step from the application manifest. `task_slot!(SYS, sys)` declares
/// a `static SYS: TaskSlot` addressing whichever task the manifest assigns
/// the role `sys`.
#[macro_export]
macro_rules! task_slot {
    ($vis:vis $var:ident, $task_name:ident) => {
        #[used]
        $vis static $var: $crate::task_slot::TaskSlot =
            $crate::task_slot::TaskSlot::UNBOUND;

        const _: &str = stringify!($task_name);
    };
}

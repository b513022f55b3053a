/*
 * Copyright (C) 2023 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

use num_traits::PrimInt;

/// Rounds the given value up to the given alignment
///
/// # Examples
///
/// ```
/// use base::util::math;
/// assert_eq!(math::round_up(0x123, 0x1000), 0x1000);
/// ```
pub fn round_up<T: PrimInt>(value: T, align: T) -> T {
    (value + align - T::one()) & !(align - T::one())
}

/// Rounds the given value down to the given alignment
///
/// # Examples
///
/// ```
/// use base::util::math;
/// assert_eq!(math::round_dn(0x123, 0x1000), 0x0);
/// ```
pub fn round_dn<T: PrimInt>(value: T, align: T) -> T {
    value & !(align - T::one())
}

/// Returns true if `addr` is aligned to `align`
pub fn is_aligned<T: PrimInt>(addr: T, align: T) -> bool {
    (addr & (align - T::one())) == T::zero()
}

/// Assuming that `startx` < `endx` and `endx` is not included (that means with start=0 and end=10
/// 0 .. 9 is used), the function determines whether the two ranges overlap anywhere.
pub fn overlaps<T: Ord>(start1: T, end1: T, start2: T, end2: T) -> bool {
    (start1 >= start2 && start1 < end2) // start in range
    || (end1 > start2 && end1 <= end2)  // end in range
    || (start1 < start2 && end1 > end2) // complete overlapped
}

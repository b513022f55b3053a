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

use bitflags::bitflags;

bitflags! {
    /// The access rights of a memory endpoint, as stored in its first register
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Perm : u32 {
        const R = 1;
        const W = 2;
        const X = 4;
        /// The rights of a private window
        const RW = Self::R.bits() | Self::W.bits();
    }
}

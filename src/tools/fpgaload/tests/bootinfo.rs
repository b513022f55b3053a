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

mod common;

use base::cfg;
use base::kif::{boot, TileAttr, TileDesc, TileType};
use base::mem::GlobAddr;
use base::util;
use fpgaload::bootinfo::{self, ModSpec};
use fpgaload::layout::Layout;
use fpgaload::mock::MockMem;
use fpgaload::Error;

use base::tcu::TileId;

fn mem() -> MockMem {
    MockMem::new(TileId::new(0, cfg::MEM_TILE as u8))
}

fn specs(dir: &std::path::Path, sizes: &[usize]) -> Vec<ModSpec> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| ModSpec {
            name: format!("mod{}", i),
            path: common::write_module(dir, &format!("mod{}.bin", i), *size, i as u8 + 1),
        })
        .collect()
}

#[test]
fn blob_describes_modules() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = [1, 4096, 5000, 0x3000 + 7];
    let modules = bootinfo::read_modules(&specs(dir.path(), &sizes)).unwrap();

    let layout = Layout::plan(4, 2, false, cfg::PMP_SIZE_NOVM).unwrap();
    let mut mem = mem();
    bootinfo::load_boot_info(&mut mem, &layout, &modules).unwrap();

    let blob = mem.read_vec(cfg::KENV_ADDR, cfg::KENV_SIZE as usize);
    let info = boot::Info::from_bytes(&blob).unwrap();
    assert_eq!(info.mod_count, sizes.len() as u64);
    assert_eq!(info.tile_count, 5);
    assert_eq!(info.mem_count, 1);
    assert_eq!(info.serv_count, 0);

    let mut last = None;
    for (i, size) in sizes.iter().enumerate() {
        let off = boot::Info::SIZE + i * boot::Mod::SIZE;
        let m = boot::Mod::from_bytes(&blob[off..]).unwrap();
        assert_eq!(m.name(), format!("mod{}", i));
        assert_eq!(m.size, *size as u64);
        assert_eq!(m.addr.tile(), cfg::MEM_TILE);
        assert!(util::math::is_aligned(m.addr.offset(), cfg::PAGE_SIZE));
        if let Some(prev) = last {
            assert!(m.addr.offset() > prev);
        }
        last = Some(m.addr.offset());

        // the payload has been copied to the announced address
        let payload = mem.read_vec(m.addr.offset(), *size);
        assert!(payload.iter().all(|b| *b == i as u8 + 1));
    }
    assert_eq!(
        util::read_u64(&blob, boot::Info::SIZE).unwrap(),
        GlobAddr::new_with(cfg::MEM_TILE, layout.mods().addr).raw()
    );
}

#[test]
fn blob_describes_tiles_and_memory() {
    let layout = Layout::plan(7, 7, false, cfg::PMP_SIZE_NOVM).unwrap();
    let mut mem = mem();
    let bi = bootinfo::load_boot_info(&mut mem, &layout, &[]).unwrap();

    let blob = mem.read_vec(cfg::KENV_ADDR, bi.size());
    let descs = &blob[boot::Info::SIZE..];
    let desc = |i: usize| TileDesc::new_from(util::read_u64(descs, i * 8).unwrap());

    assert_eq!(desc(0).attr(), TileAttr::ROCKET | TileAttr::IMEM);
    assert_eq!(desc(5).attr(), TileAttr::BOOM | TileAttr::IMEM);
    assert_eq!(
        desc(6).attr(),
        TileAttr::BOOM | TileAttr::IMEM | TileAttr::NIC | TileAttr::SERIAL
    );
    assert_eq!(desc(0).mem_size(), cfg::PMP_SIZE_NOVM);
    assert_eq!(desc(7).tile_type(), TileType::Mem);
    assert_eq!(desc(7).mem_size(), cfg::DRAM_SIZE);

    // without modules, all memory behind the windows is free
    let mem_rec = &descs[8 * 8..];
    assert_eq!(
        util::read_u64(mem_rec, 0).unwrap(),
        GlobAddr::new_with(cfg::MEM_TILE, layout.mods().addr).raw()
    );
    assert_eq!(
        util::read_u64(mem_rec, 8).unwrap(),
        cfg::DRAM_SIZE - layout.mods().addr
    );
}

#[test]
fn unreadable_module_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut specs = specs(dir.path(), &[16]);
    specs.push(ModSpec {
        name: "missing".to_string(),
        path: dir.path().join("does-not-exist"),
    });

    match bootinfo::read_modules(&specs) {
        Err(Error::ModuleRead { name, .. }) => assert_eq!(name, "missing"),
        r => panic!("unexpected result {:?}", r.map(|m| m.len())),
    }
}

#[test]
fn modules_have_to_fit_into_memory() {
    let dir = tempfile::tempdir().unwrap();
    let modules = bootinfo::read_modules(&specs(dir.path(), &[0x2000])).unwrap();

    // a single huge window leaves only one page of DRAM
    let layout = Layout::plan(1, 1, false, cfg::DRAM_SIZE - 0x3000).unwrap();
    assert_eq!(layout.mods().size, cfg::PAGE_SIZE);
    let mut mem = mem();
    assert!(matches!(
        bootinfo::load_boot_info(&mut mem, &layout, &modules),
        Err(Error::LayoutOverflow { .. })
    ));
    assert_eq!(mem.end(), 0);
}

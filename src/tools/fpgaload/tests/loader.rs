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
use base::env::EnvData;
use base::kif::Perm;
use base::mem::GlobAddr;
use base::tcu::{MemEp, TileId, INVALID_ACT, PMP_EP, TCU};
use base::util;
use fpgaload::desc;
use fpgaload::device::MemDevice;
use fpgaload::layout::Layout;
use fpgaload::loader::{self, Image, LoadParams};
use fpgaload::mock::{MockPlatform, TileCall};
use fpgaload::tileinit;
use fpgaload::Error;

#[test]
fn marshal_three_args() {
    let (area, argv, envp) = loader::marshal_args(&["a", "bb", "ccc"], None).unwrap();
    assert_eq!(argv, cfg::ARGV_START);
    assert_eq!(envp, 0);

    let bytes = area.bytes();
    let ptr = |i: usize| util::read_u64(bytes, i * 8).unwrap();
    let string = |addr: u64| {
        let off = (addr - area.start()) as usize;
        util::cstr_slice_to_str(&bytes[off..]).unwrap().to_string()
    };

    // three pointers and the terminating NULL
    assert_eq!(ptr(3), 0);
    assert_eq!(ptr(0), cfg::ARGV_START + 4 * 8);
    assert_eq!(string(ptr(0)), "a");
    assert_eq!(string(ptr(1)), "bb");
    assert_eq!(string(ptr(2)), "ccc");
    assert!(ptr(1) >= ptr(0) + 2);
    assert!(ptr(2) >= ptr(1) + 3);
    assert!(ptr(1) % 8 == 0 && ptr(2) % 8 == 0);
    assert_eq!(area.cursor(), ptr(2) + 8);
}

#[test]
fn argument_space_is_limited() {
    // one pointer, the NULL pointer and the string including its terminator fill the space exactly
    let fits = "x".repeat(1007);
    assert!(loader::marshal_args(&[fits.as_str()], None).is_ok());

    let too_long = "x".repeat(1008);
    match loader::marshal_args(&[too_long.as_str()], None) {
        Err(Error::ArgSpace { needed, limit }) => {
            assert_eq!(needed, 16 + 1016);
            assert_eq!(limit, cfg::ARGS_END - cfg::ARGV_START);
        },
        r => panic!("unexpected result {:?}", r.map(|a| a.1)),
    }

    // the log flags need space, too
    assert!(matches!(
        loader::marshal_args(&[fits.as_str()], Some("info")),
        Err(Error::ArgSpace { .. })
    ));
}

#[test]
fn pmp_endpoints() {
    let mut plat = MockPlatform::new(4, 2);
    let layout = Layout::plan(4, 2, true, cfg::PMP_SIZE_VM).unwrap();
    tileinit::init_tiles(&mut plat.tiles, &plat.mem, &layout).unwrap();

    let pmp = TCU::unpack_mem_regs(&plat.tiles[1].ep(PMP_EP)).unwrap();
    assert_eq!(pmp, MemEp {
        act: INVALID_ACT,
        tile: TileId::new(0, cfg::MEM_TILE as u8),
        addr: cfg::PMP_ADDR + cfg::PMP_SIZE_VM,
        size: cfg::PMP_SIZE_VM,
        perm: Perm::RW,
    });

    // with virtual memory, tiles without a program get no window
    assert!(!TCU::is_valid(&plat.tiles[2].ep(PMP_EP)));
    assert!(!TCU::is_valid(&plat.tiles[3].ep(PMP_EP)));

    let tile = &plat.tiles[0];
    assert_eq!(tile.calls()[0], TileCall::TcuReset);
    assert_eq!(tile.calls()[1], TileCall::EnableTrace);
    assert_eq!(tile.count(|c| matches!(c, TileCall::SetEp(..))), 128 + 1);
}

struct Loaded {
    plat: MockPlatform,
    layout: Layout,
    _dir: tempfile::TempDir,
}

fn load(logflags: Option<&str>, twice: bool) -> Loaded {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_program(dir.path(), "hello", cfg::ENTRY_ADDR);
    let prog = common::program(&path, &["-v", "world"]);

    let mut plat = MockPlatform::new(3, 2);
    let layout = Layout::plan(3, 2, false, cfg::PMP_SIZE_NOVM).unwrap();
    let image = Image::open(&path, layout.pmp_size()).unwrap();
    let descs = desc::all_descs(&layout);
    let ids = vec![
        TileId::new(0, 0),
        TileId::new(0, 1),
        TileId::new(0, 2),
        TileId::new(0, 8),
    ];
    let params = LoadParams {
        layout: &layout,
        descs: &descs,
        tile_ids: &ids,
        logflags,
    };

    for _ in 0..if twice { 2 } else { 1 } {
        for idx in 0..2 {
            loader::load_program(&mut plat.tiles[idx], &mut plat.mem, &params, idx, &prog, &image)
                .unwrap();
        }
    }

    Loaded {
        plat,
        layout,
        _dir: dir,
    }
}

#[test]
fn program_and_environment() {
    let Loaded {
        mut plat, layout, ..
    } = load(Some("kernel,info"), false);

    for idx in 0..2 {
        let win = layout.window(idx);

        let code = plat.mem.read_vec(layout.translate(idx, cfg::ENTRY_ADDR), common::CODE.len());
        assert_eq!(code, common::CODE);
        let bss = plat.mem.read_vec(
            layout.translate(idx, cfg::ENTRY_ADDR) + common::CODE.len() as u64,
            common::BSS_SIZE as usize,
        );
        assert!(bss.iter().all(|b| *b == 0));

        // the jump at the reset vector is the first word of the window
        assert_eq!(plat.mem.read_u64(win.addr).unwrap(), 0x306f);

        let env_off = layout.translate(idx, cfg::ENV_START);
        let env = EnvData::from_bytes(&plat.mem.read_vec(env_off, 0x100)).unwrap();
        assert_eq!(env.platform, cfg::PLATFORM_HW);
        assert_eq!(env.tile_id, idx as u64);
        assert_eq!(env.tile_desc, desc::tile_desc(idx, 3, false, cfg::PMP_SIZE_NOVM));
        assert_eq!(env.argc, 3);
        assert_eq!(env.argv, cfg::ARGV_START);
        assert_ne!(env.envp, 0);
        assert_eq!(env.raw_tile_ids.len(), 4);
        assert_eq!(env.raw_tile_ids[3], TileId::new(0, 8));
        if idx == 0 {
            assert_eq!(env.kenv, GlobAddr::new_with(cfg::MEM_TILE, cfg::KENV_ADDR).raw());
        }
        else {
            assert_eq!(env.kenv, 0);
        }

        let envp = plat.mem.read_u64(layout.translate(idx, env.envp)).unwrap();
        let var = plat.mem.read_vec(layout.translate(idx, envp), 16);
        assert_eq!(util::cstr_slice_to_str(&var), Some("LOG=kernel,info"));
    }

    // loading enables the clock, but never starts the tile
    assert!(plat.tiles[0].calls().contains(&TileCall::EnableClock));
    assert!(!plat.tiles.iter().any(|t| t.started()));
    assert!(plat.tiles[2].calls().is_empty());
}

#[test]
fn loading_is_idempotent() {
    let once = load(None, false);
    let twice = load(None, true);
    assert_eq!(once.plat.mem.end(), twice.plat.mem.end());
    for idx in 0..2 {
        let start = once.layout.window(idx).addr;
        assert_eq!(
            once.plat.mem.read_vec(start, 0x5000),
            twice.plat.mem.read_vec(start, 0x5000)
        );
    }
}

#[test]
fn segments_have_to_fit_into_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge");
    let bin = common::elf(cfg::ENTRY_ADDR, &[common::Segment {
        addr: cfg::ENTRY_ADDR,
        data: common::CODE.to_vec(),
        mem_size: cfg::PMP_SIZE_VM,
    }]);
    std::fs::write(&path, bin).unwrap();

    assert!(Image::open(&path, cfg::PMP_SIZE_NOVM).is_ok());
    assert!(matches!(
        Image::open(&path, cfg::PMP_SIZE_VM),
        Err(Error::SegmentOutOfWindow { .. })
    ));
}

#[test]
fn wrong_entry_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_program(dir.path(), "bad", cfg::ENTRY_ADDR + 0x1000);
    match Image::open(&path, cfg::PMP_SIZE_NOVM) {
        Err(Error::EntryMismatch { entry, expected, .. }) => {
            assert_eq!(entry, cfg::ENTRY_ADDR + 0x1000);
            assert_eq!(expected, cfg::ENTRY_ADDR);
        },
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("image with wrong entry accepted"),
    }
}

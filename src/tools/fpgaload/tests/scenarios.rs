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

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use base::cfg;
use base::tcu::TileId;
use fpgaload::bootinfo::ModSpec;
use fpgaload::bringup::{self, ARQ_TIMEOUT};
use fpgaload::console::{Console, MailboxConsole, QUIT_KEY};
use fpgaload::device::MemDevice;
use fpgaload::diag::Outcome;
use fpgaload::layout::Layout;
use fpgaload::mock::{MockPlatform, ScriptedKeys, TileCall};
use fpgaload::supervisor::{self, CancelToken, RunState, Watchdog};
use fpgaload::Error;

#[test]
fn scenario_a_layout() {
    const W: u64 = 0x20_0000;
    let layout = Layout::plan(3, 3, false, W).unwrap();
    assert_eq!(layout.kenv().addr, 0);
    assert_eq!(layout.mailbox().addr, layout.kenv().end());
    assert_eq!(layout.window(0).addr, cfg::PMP_ADDR);
    assert_eq!(layout.window(1).addr, cfg::PMP_ADDR + W);
    assert_eq!(layout.window(2).addr, cfg::PMP_ADDR + 2 * W);
    assert_eq!(layout.mods().addr, (cfg::PMP_ADDR + 3 * W + 0xFFF) & !0xFFF);
    assert_eq!(Layout::plan(3, 3, false, W).unwrap(), layout);
}

fn mailbox_console(plat: &mut MockPlatform, keys: &[&[u8]]) -> (MailboxConsole<ScriptedKeys>, Layout) {
    let layout = Layout::plan(plat.tiles.len(), 1, false, cfg::PMP_SIZE_NOVM).unwrap();
    let console = MailboxConsole::new(ScriptedKeys::new(keys), &mut plat.mem, layout.mailbox()).unwrap();
    (console, layout)
}

#[test]
fn scenario_b_timeout_extracts_diagnostics_once_per_tile() {
    let mut plat = MockPlatform::new(3, 2);
    plat.tiles[1].fail.packets = true;
    plat.tiles[1].fail.flits = true;
    plat.tiles[1].fail.tcu_log = 2;
    plat.tiles[2].fail.trace = 1;
    let (mut console, _) = mailbox_console(&mut plat, &[]);

    let token = CancelToken::new();
    let _watchdog = Watchdog::start(token.clone(), Duration::from_millis(50), || {}).unwrap();
    let mut out = Vec::new();
    let state = supervisor::run(&mut plat, &mut console, &mut out, &token);
    assert_eq!(state, RunState::TimedOut);
    assert_eq!(token.state(), RunState::TimedOut);
    assert!(out.is_empty());

    let logs = tempfile::tempdir().unwrap();
    let reports = supervisor::teardown(&mut plat, &mut console, state, logs.path());
    assert_eq!(reports.len(), 3);

    for (idx, tile) in plat.tiles.iter().enumerate() {
        assert_eq!(reports[idx].tile, idx);
        assert_eq!(tile.count(|c| *c == TileCall::ArqPackets), 1);
        assert_eq!(tile.count(|c| *c == TileCall::TcuFlits), 1);
        assert_eq!(tile.calls().last(), Some(&TileCall::Stop));
        assert!(tile.calls().contains(&TileCall::SetArq(false, None)));
    }

    // tile 0 worked on the first attempt
    assert!(matches!(reports[0].tcu_log, Outcome::Done));
    assert!(matches!(reports[0].trace, Outcome::Done));

    // tile 1 lost its TCU log after exactly one retry, but still delivered its trace
    assert!(reports[1].packets.is_err());
    assert!(reports[1].flits.is_err());
    assert!(matches!(reports[1].tcu_log, Outcome::Failed(_)));
    assert!(matches!(reports[1].trace, Outcome::Done));
    let log_path = logs.path().join("pm1-tcu-cmds.log");
    assert_eq!(plat.tiles[1].count(|c| matches!(c, TileCall::DumpTcuLog(..))), 2);
    assert!(plat.tiles[1].calls().contains(&TileCall::DumpTcuLog(log_path, true)));
    assert_eq!(plat.tiles[1].count(|c| *c == TileCall::TcuReset), 1);

    // tile 2 recovered its trace after a reset
    assert!(matches!(reports[2].trace, Outcome::Recovered(_)));
    assert!(reports[2].trace.is_written());
    assert_eq!(plat.tiles[2].count(|c| matches!(c, TileCall::DumpTrace(_, true))), 1);
}

#[test]
fn shutdown_message_stops_cleanly() {
    let mut plat = MockPlatform::new(2, 2);
    plat.noc.push_incoming(b"hello \xFF\n");
    plat.noc.push_incoming(b"[kernel] Shutting down\n");
    plat.noc.push_incoming(b"never read\n");
    let (mut console, _) = mailbox_console(&mut plat, &[]);

    let token = CancelToken::new();
    let mut out = Vec::new();
    let state = supervisor::run(&mut plat, &mut console, &mut out, &token);
    assert_eq!(state, RunState::Stopped);
    assert_eq!(out, b"hello \xFF\n[kernel] Shutting down\n");

    let logs = tempfile::tempdir().unwrap();
    let reports = supervisor::teardown(&mut plat, &mut console, state, logs.path());
    for (report, tile) in reports.iter().zip(&plat.tiles) {
        assert!(matches!(report.tcu_log, Outcome::Skipped));
        assert!(matches!(report.trace, Outcome::Skipped));
        assert!(report.packets.is_ok());
        assert_eq!(tile.count(|c| matches!(c, TileCall::DumpTcuLog(..))), 0);
    }
}

#[test]
fn quit_key_aborts_run() {
    let mut plat = MockPlatform::new(1, 2);
    let (mut console, _) = mailbox_console(&mut plat, &[b"ls\n", &[QUIT_KEY]]);

    let token = CancelToken::new();
    let mut out = Vec::new();
    let state = supervisor::run(&mut plat, &mut console, &mut out, &token);
    assert_eq!(state, RunState::TimedOut);
    // nobody registered in the mailbox, so the input before the quit key was dropped
    assert!(plat.noc.sent().is_empty());
}

#[test]
fn scenario_c_mailbox_drops_until_registered() {
    let mut plat = MockPlatform::new(4, 2);
    let layout = Layout::plan(4, 1, false, cfg::PMP_SIZE_NOVM).unwrap();
    let mbox = layout.mailbox();

    // stale registration from a previous run
    plat.mem.write_u64(mbox.addr, 0x0003).unwrap();
    plat.mem.write_u64(mbox.addr + 8, 7).unwrap();

    let mut console =
        MailboxConsole::new(ScriptedKeys::new(&[b"q"]), &mut plat.mem, mbox).unwrap();
    assert_eq!(plat.mem.read_u64(mbox.addr).unwrap(), 0);
    assert_eq!(plat.mem.read_u64(mbox.addr + 8).unwrap(), 0);

    console.write(&mut plat, b"x").unwrap();
    assert!(plat.noc.sent().is_empty());

    // tile 3 claims the console with endpoint 5
    plat.mem.write_u64(mbox.addr, TileId::new(0, 3).raw() as u64).unwrap();
    plat.mem.write_u64(mbox.addr + 8, 5).unwrap();
    console.write(&mut plat, b"y").unwrap();
    assert_eq!(plat.noc.sent(), &[(TileId::new(0, 3), 5, b"y".to_vec())]);

    // keys are forwarded to the same destination
    assert!(!console.poll_for_stop(&mut plat).unwrap());
    assert_eq!(plat.noc.sent().len(), 2);
    assert_eq!(plat.noc.sent()[1].2, b"q");

    console.cleanup(&mut plat).unwrap();
}

fn setup(dir: &std::path::Path, entries: &[u64]) -> fpgaload::config::Config {
    let programs = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let path = common::write_program(dir, &format!("prog{}", i), *entry);
            common::program(&path, &["arg"])
        })
        .collect();
    let mods = vec![ModSpec {
        name: "fs".to_string(),
        path: common::write_module(dir, "fs.img", 0x1800, 0xAB),
    }];
    common::config(programs, mods)
}

#[test]
fn scenario_d_entry_mismatch_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path(), &[cfg::ENTRY_ADDR, cfg::ENTRY_ADDR + 0x10]);

    let mut plat = MockPlatform::new(4, 2);
    let res = bringup::bring_up(&mut plat, &cfg);
    assert!(matches!(res, Err(Error::EntryMismatch { .. })));
    assert!(!plat.tiles.iter().any(|t| t.started()));
    // the programs are checked before anything is written
    assert_eq!(plat.mem.end(), 0);
}

#[test]
fn tcu_version_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path(), &[cfg::ENTRY_ADDR]);

    let mut plat = MockPlatform::new(4, 2);
    plat.tiles[2].set_version(1);
    match bringup::bring_up(&mut plat, &cfg) {
        Err(Error::TcuVersion { tile, found, .. }) => {
            assert_eq!(tile, "PM2");
            assert_eq!(found, 1);
        },
        r => panic!("unexpected result {:?}", r.map(|_| ())),
    }
    assert!(!plat.tiles.iter().any(|t| t.started()));
}

#[test]
fn complete_bringup() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = setup(dir.path(), &[cfg::ENTRY_ADDR, cfg::ENTRY_ADDR]);
    cfg.debug = Some(1);

    let mut plat = MockPlatform::new(4, 2);
    let res = bringup::bring_up(&mut plat, &cfg).unwrap();
    assert_eq!(res.bootinfo.info.mod_count, 1);
    assert_eq!(res.bootinfo.info.tile_count, 5);

    // all tiles are stopped and checked before anything else happens
    for tile in &plat.tiles {
        assert_eq!(tile.calls()[0], TileCall::Stop);
        assert!(tile.calls()[1..].contains(&TileCall::TcuVersion));
    }

    // the ARQ is off during the upload and on with a reduced timeout afterwards
    assert_eq!(plat.mem.arq_history(), &[(false, None), (true, Some(ARQ_TIMEOUT))]);
    for tile in &plat.tiles {
        let arq = tile
            .calls()
            .iter()
            .filter(|c| matches!(c, TileCall::SetArq(..)))
            .collect::<Vec<_>>();
        assert_eq!(arq, vec![
            &TileCall::SetArq(false, None),
            &TileCall::SetArq(true, Some(ARQ_TIMEOUT))
        ]);
    }

    // only loaded tiles get a clock before the start; the debug tile is not started
    assert_eq!(plat.tiles[0].count(|c| *c == TileCall::EnableClock), 1);
    assert_eq!(plat.tiles[3].count(|c| *c == TileCall::EnableClock), 0);
    assert!(plat.tiles[0].started());
    assert!(!plat.tiles[1].started());
    assert!(plat.tiles[2].started());
    assert!(plat.tiles[3].started());
    assert_eq!(plat.tiles[0].calls().last(), Some(&TileCall::Start));

    let module = res.bootinfo.mods[0].addr.offset();
    assert_eq!(module, res.layout.mods().addr);
    assert_eq!(plat.mem.read_vec(module, 0x1800), vec![0xAB; 0x1800]);
    assert_eq!(
        res.bootinfo.mem.addr().offset(),
        res.layout.mods().addr + 0x2000
    );
}

#[test]
fn debug_tile_has_to_exist() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = setup(dir.path(), &[cfg::ENTRY_ADDR]);
    cfg.debug = Some(4);

    let mut plat = MockPlatform::new(4, 2);
    assert!(matches!(bringup::bring_up(&mut plat, &cfg), Err(Error::Config(_))));
}

#[test]
fn dry_run_image() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path(), &[cfg::ENTRY_ADDR]);

    let mut plat = MockPlatform::new(MockPlatform::TILES, 2);
    let res = bringup::bring_up(&mut plat, &cfg).unwrap();

    let image = dir.path().join("image.bin");
    let end = res.bootinfo.mem.addr().offset();
    plat.mem.save(&image, end).unwrap();
    assert_eq!(std::fs::metadata(&image).unwrap().len(), end);

    let read_at = |off: u64, len: usize| {
        let mut file = File::open(&image).unwrap();
        file.seek(SeekFrom::Start(off)).unwrap();
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).unwrap();
        buf
    };
    assert_eq!(read_at(res.bootinfo.mods[0].addr.offset(), 4), vec![0xAB; 4]);
    assert_eq!(read_at(cfg::PMP_ADDR, 8), 0x306fu64.to_le_bytes().to_vec());
}

#[test]
fn pasted_quit_key_is_forwarded() {
    let mut plat = MockPlatform::new(2, 2);
    let (mut console, layout) = mailbox_console(&mut plat, &[b"a\x1db", &[QUIT_KEY]]);
    plat.mem.write_u64(layout.mailbox().addr, TileId::new(0, 1).raw() as u64).unwrap();
    plat.mem.write_u64(layout.mailbox().addr + 8, 3).unwrap();

    let token = CancelToken::new();
    let state = supervisor::run(&mut plat, &mut console, &mut Vec::<u8>::new(), &token);
    assert_eq!(state, RunState::TimedOut);
    assert_eq!(plat.noc.sent(), &[(TileId::new(0, 1), 3, b"a\x1db".to_vec())]);
}

#[test]
fn launch_runs_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path(), &[cfg::ENTRY_ADDR]);
    let mut plat = MockPlatform::new(2, 2);
    let res = bringup::connect(&mut plat, cfg.version).and_then(|_| bringup::load(&mut plat, &cfg));
    assert!(res.is_ok());
    plat.noc.push_incoming(b"Shutting down\n");
    let (mut console, _) = mailbox_console(&mut plat, &[]);

    let token = CancelToken::new();
    let ready = dir.path().join(".ready");
    let logs = dir.path().join("log");
    let state = supervisor::launch(
        &mut plat,
        &mut console,
        &mut Vec::<u8>::new(),
        &token,
        None,
        &ready,
        &logs,
    )
    .unwrap();
    assert_eq!(state, RunState::Stopped);
    assert_eq!(std::fs::read_to_string(&ready).unwrap(), "1");
    for tile in &plat.tiles {
        assert!(tile.started());
        assert_eq!(tile.calls().last(), Some(&TileCall::Stop));
    }
}

#[test]
fn interrupt_during_start_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut plat = MockPlatform::new(2, 2);
    let (mut console, _) = mailbox_console(&mut plat, &[]);

    // the interrupt arrives while the tiles are started; it has to cancel, not terminate
    let token = CancelToken::new();
    token.cancel();
    let logs = dir.path().join("log");
    let state = supervisor::launch(
        &mut plat,
        &mut console,
        &mut Vec::<u8>::new(),
        &token,
        None,
        &dir.path().join(".ready"),
        &logs,
    )
    .unwrap();
    assert_eq!(state, RunState::TimedOut);
    assert_eq!(token.state(), RunState::TimedOut);
    for (idx, tile) in plat.tiles.iter().enumerate() {
        assert!(tile.started());
        assert!(tile
            .calls()
            .contains(&TileCall::DumpTcuLog(logs.join(format!("pm{}-tcu-cmds.log", idx)), false)));
        assert_eq!(tile.calls().last(), Some(&TileCall::Stop));
    }
}

#[test]
fn failed_ready_marker_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut plat = MockPlatform::new(3, 2);
    let (mut console, _) = mailbox_console(&mut plat, &[]);

    let token = CancelToken::new();
    let ready = dir.path().join("missing").join(".ready");
    let res = supervisor::launch(
        &mut plat,
        &mut console,
        &mut Vec::<u8>::new(),
        &token,
        Some(2),
        &ready,
        &dir.path().join("log"),
    );
    assert!(matches!(res, Err(Error::Io(_))));
    // interrupts and timeouts no longer terminate the process
    assert_ne!(token.state(), RunState::Waiting);
    for tile in &plat.tiles {
        assert!(tile.calls().contains(&TileCall::SetArq(false, None)));
        assert_eq!(tile.count(|c| matches!(c, TileCall::DumpTrace(..))), 1);
        assert_eq!(tile.calls().last(), Some(&TileCall::Stop));
    }
    assert!(!plat.tiles[2].started());
}

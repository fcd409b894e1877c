//! Debugger session tests
//!
//! Run control (breakpoints, traps, conditional breaks, scanline and frame
//! advance), ROM patching, bank selection and function persistence.

use vcs_debug::{
    Cartridge, Debugger, DebuggerConfig, DebuggerError, StopReason, System, TrapHit, TrapKind,
};

fn rom_with(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0xEA; 4096];
    rom[..program.len()].copy_from_slice(program);
    rom[0xFFC] = 0x00;
    rom[0xFFD] = 0xF0;
    rom
}

fn debugger_with_config(program: &[u8], config: DebuggerConfig) -> Debugger {
    let cart = Cartridge::new(rom_with(program), false).unwrap();
    Debugger::new(System::new(cart).unwrap(), config).unwrap()
}

fn debugger(program: &[u8]) -> Debugger {
    debugger_with_config(program, DebuggerConfig::default())
}

/// INX ; JMP $F000
const COUNT_X: [u8; 4] = [0xE8, 0x4C, 0x00, 0xF0];

#[test]
fn test_breakpoint_stops_run() {
    let mut dbg = debugger(&COUNT_X);
    assert!(dbg.toggle_breakpoint(0xF001));

    let reason = dbg.run().unwrap();
    assert_eq!(reason, StopReason::Breakpoint(0xF001));
    assert_eq!(reason.to_string(), "breakpoint at $F001");
    assert_eq!(dbg.system().cpu().x(), 1);

    // Resuming from a breakpoint executes the instruction under it
    assert_eq!(dbg.run().unwrap(), StopReason::Breakpoint(0xF001));
    assert_eq!(dbg.system().cpu().x(), 2);

    dbg.clear_all_breakpoints();
    assert!(!dbg.breakpoint(0xF001));
}

#[test]
fn test_conditional_break_stops_run() {
    let mut dbg = debugger(&COUNT_X);
    assert_eq!(dbg.add_break_if("x == 5").unwrap(), 0);
    assert_eq!(dbg.add_break_if("*$80 != 0").unwrap(), 1);

    let reason = dbg.run().unwrap();
    assert_eq!(
        reason,
        StopReason::ConditionalBreak {
            index: 0,
            condition: "x == 5".to_string()
        }
    );
    assert_eq!(dbg.system().cpu().x(), 5);
    assert_eq!(dbg.break_ifs().collect::<Vec<_>>(), vec!["x == 5", "*$80 != 0"]);

    assert_eq!(dbg.remove_break_if(0).unwrap(), "x == 5");
    assert_eq!(dbg.remove_break_if(5), Err(DebuggerError::NoSuchBreak(5)));
    dbg.clear_break_ifs();
    assert_eq!(dbg.break_ifs().count(), 0);
}

#[test]
fn test_bad_condition_is_rejected() {
    let mut dbg = debugger(&COUNT_X);
    assert!(dbg.add_break_if("x ==").is_err());
    assert_eq!(dbg.break_ifs().count(), 0);
}

#[test]
fn test_write_trap_stops_run() {
    // INX ; STX $80 ; JMP $F000
    let mut dbg = debugger(&[0xE8, 0x86, 0x80, 0x4C, 0x00, 0xF0]);
    assert!(dbg.toggle_write_trap(0x0080));

    let reason = dbg.run().unwrap();
    assert_eq!(
        reason,
        StopReason::Trap(TrapHit {
            address: 0x0080,
            kind: TrapKind::Write
        })
    );
    assert_eq!(reason.to_string(), "write trap at $0080");
    assert_eq!(dbg.peek(0x80), 1);
    assert_eq!(dbg.system().cpu().pc(), 0xF003);
}

#[test]
fn test_read_trap_reported_by_step() {
    // LDA $81
    let mut dbg = debugger(&[0xA5, 0x81]);
    dbg.toggle_read_trap(0x0081);
    assert_eq!(
        dbg.step().unwrap(),
        StopReason::Trap(TrapHit {
            address: 0x0081,
            kind: TrapKind::Read
        })
    );

    // Inspecting memory never fires the trap
    dbg.peek(0x81);
    dbg.clear_all_traps();
    assert_eq!(dbg.step().unwrap(), StopReason::Completed);
}

#[test]
fn test_run_gives_up_at_cycle_limit() {
    let config = DebuggerConfig {
        max_run_cycles: 1000,
        ..DebuggerConfig::default()
    };
    let mut dbg = debugger_with_config(&COUNT_X, config);
    assert_eq!(dbg.run().unwrap(), StopReason::CycleLimit);
    assert!(dbg.system().cpu().cycles() >= 1000);
    assert_eq!(dbg.rewind_state().unwrap(), "run");
    assert_eq!(dbg.system().cpu().cycles(), 0);
}

#[test]
fn test_next_scanline() {
    let mut dbg = debugger(&COUNT_X);
    assert_eq!(dbg.next_scanline(0).unwrap(), StopReason::Completed);
    assert!(dbg.rewind().is_empty());

    assert_eq!(dbg.next_scanline(3).unwrap(), StopReason::Completed);
    assert_eq!(dbg.evaluate("_scan").unwrap(), 3);
    assert_eq!(dbg.rewind_state().unwrap(), "scanlines");
    assert_eq!(dbg.evaluate("_scan").unwrap(), 0);
}

#[test]
fn test_next_frame() {
    // LDA #2 ; STA VSYNC ; LDA #0 ; STA VSYNC ; JMP $F000
    let program = [
        0xA9, 0x02, 0x85, 0x00, 0xA9, 0x00, 0x85, 0x00, 0x4C, 0x00, 0xF0,
    ];
    let mut dbg = debugger(&program);

    assert_eq!(dbg.next_frame(1).unwrap(), StopReason::Completed);
    assert_eq!(dbg.evaluate("_fcount").unwrap(), 1);
    assert_eq!(dbg.system().cpu().pc(), 0xF008);

    assert_eq!(dbg.next_frame(2).unwrap(), StopReason::Completed);
    assert_eq!(dbg.evaluate("_fcount").unwrap(), 3);

    let messages: Vec<_> = dbg.rewind().messages().collect();
    assert_eq!(messages, vec!["frames", "frame"]);
}

#[test]
fn test_breakpoint_interrupts_frame_advance() {
    let program = [
        0xA9, 0x02, 0x85, 0x00, 0xA9, 0x00, 0x85, 0x00, 0x4C, 0x00, 0xF0,
    ];
    let mut dbg = debugger(&program);
    dbg.toggle_breakpoint(0xF004);
    assert_eq!(dbg.next_frame(1).unwrap(), StopReason::Breakpoint(0xF004));
    assert_eq!(dbg.evaluate("_fcount").unwrap(), 0);
}

#[test]
fn test_trace_without_call_is_a_step() {
    let mut dbg = debugger(&COUNT_X);
    assert_eq!(dbg.trace().unwrap(), StopReason::Completed);
    assert_eq!(dbg.system().cpu().pc(), 0xF001);
    assert_eq!(dbg.rewind().peek().unwrap().message(), "step");
}

#[test]
fn test_patch_rom_is_rewindable() {
    let mut dbg = debugger(&COUNT_X);
    assert_eq!(dbg.peek(0xF000), 0xE8);

    // INX becomes INY
    assert!(dbg.patch_rom(0xF000, 0xC8));
    assert_eq!(dbg.peek(0xF000), 0xC8);
    dbg.step().unwrap();
    assert_eq!(dbg.system().cpu().y(), 1);
    assert_eq!(dbg.system().cpu().x(), 0);

    assert_eq!(dbg.rewind_state().unwrap(), "step");
    assert_eq!(dbg.rewind_state().unwrap(), "patch ROM");
    assert_eq!(dbg.peek(0xF000), 0xE8);
}

#[test]
fn test_bank_selection() {
    let mut image = vec![0xEA; 8192];
    image[0x0000] = 0x00;
    image[0x1000] = 0x01;
    image[0x1FFC] = 0x00;
    image[0x1FFD] = 0xF0;
    let system = System::new(Cartridge::new(image, false).unwrap()).unwrap();
    let mut dbg = Debugger::new(system, DebuggerConfig::default()).unwrap();

    assert_eq!(dbg.bank(), Some(1));
    assert_eq!(dbg.set_bank(0), Ok(true));
    assert_eq!(dbg.peek(0xF000), 0x00);
    assert_eq!(dbg.set_bank(7), Ok(false));

    // Debugger reads of a hotspot never switch banks
    assert_eq!(dbg.peek(0xFFF9), 0xEA);
    assert_eq!(dbg.bank(), Some(0));

    dbg.lock_bankswitch_state();
    assert_eq!(dbg.set_bank(1), Ok(false));
    dbg.unlock_bankswitch_state();

    dbg.rewind_state().unwrap();
    dbg.rewind_state().unwrap();
    dbg.rewind_state().unwrap();
    assert_eq!(dbg.bank(), Some(1));
}

#[test]
fn test_dpeek_reads_little_endian() {
    let mut dbg = debugger(&[]);
    assert_eq!(dbg.dpeek(0xFFFC), 0xF000);
}

#[test]
fn test_session_flag() {
    let mut dbg = debugger(&[]);
    assert!(!dbg.is_active());
    assert!(dbg.enter("breakpoint"));
    assert!(!dbg.enter("again"));
    assert!(dbg.is_active());
    dbg.leave();
    assert!(!dbg.is_active());
}

#[test]
fn test_function_definitions_round_trip() {
    let mut first = debugger(&[]);
    first.add_function("lives", "*$80").unwrap();
    first.add_function("dead", "lives == 0").unwrap();
    let saved = first.function_defs();
    assert_eq!(
        saved,
        vec![
            ("dead".to_string(), "lives == 0".to_string()),
            ("lives".to_string(), "*$80".to_string()),
        ]
    );

    // Dependencies first, as function_defs lists them in name order
    let mut second = debugger(&[]);
    let mut defs = saved.clone();
    defs.reverse();
    defs.push(("_reset".to_string(), "1".to_string()));
    defs.push(("broken".to_string(), "(1".to_string()));

    let failures = second.load_function_defs(defs);
    let failed: Vec<_> = failures.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(failed, vec!["_reset", "broken"]);
    assert_eq!(second.function_defs(), saved);
    assert_eq!(second.evaluate("dead").unwrap(), 1);
}

#[test]
fn test_missing_tia_reported() {
    use vcs_debug::{AddressBus, RamDevice};

    let mut bus = AddressBus::new();
    bus.add_device(0x0080, Box::new(RamDevice::new(128))).unwrap();
    let mut dbg = Debugger::new(System::with_bus(bus), DebuggerConfig::default()).unwrap();

    assert_eq!(
        dbg.next_frame(1),
        Err(DebuggerError::MissingDevice("TIA"))
    );
    assert!(dbg.evaluate("_scan").is_err());
    assert_eq!(dbg.bank(), None);
    assert!(!dbg.patch_rom(0xF000, 0));
}

#[test]
fn test_failed_step_leaves_no_rewind_point() {
    // $02 is not a supported opcode
    let mut dbg = debugger(&[0x02]);
    assert!(dbg.step().is_err());
    assert!(dbg.run().is_err());
    assert!(dbg.rewind().is_empty());
    assert_eq!(dbg.system().cpu().pc(), 0xF000);
}

#[test]
fn test_run_into_bad_opcode_is_still_undoable() {
    // INX ; INX ; $02
    let mut dbg = debugger(&[0xE8, 0xE8, 0x02]);
    assert!(dbg.run().is_err());
    assert_eq!(dbg.system().cpu().x(), 2);
    assert_eq!(dbg.rewind_state().unwrap(), "run");
    assert_eq!(dbg.system().cpu().x(), 0);
}

#[test]
fn test_refused_bank_switch_leaves_no_rewind_point() {
    let mut image = vec![0xEA; 8192];
    image[0x1FFC] = 0x00;
    image[0x1FFD] = 0xF0;
    let system = System::new(Cartridge::new(image, false).unwrap()).unwrap();
    let mut dbg = Debugger::new(system, DebuggerConfig::default()).unwrap();

    dbg.lock_bankswitch_state();
    assert_eq!(dbg.set_bank(0), Ok(false));
    assert_eq!(dbg.set_bank(9), Ok(false));
    assert!(dbg.rewind().is_empty());

    dbg.unlock_bankswitch_state();
    assert_eq!(dbg.set_bank(0), Ok(true));
    assert_eq!(dbg.rewind().messages().collect::<Vec<_>>(), vec!["bank"]);
}

#[test]
fn test_reset_vector_does_not_fire_read_trap() {
    let mut dbg = debugger(&COUNT_X);
    dbg.toggle_read_trap(0xFFFC);
    dbg.reset();
    assert_eq!(dbg.step().unwrap(), StopReason::Completed);
    assert_eq!(dbg.system().cpu().x(), 1);
}

#[test]
fn test_watches_refresh_at_each_stop() {
    // INX ; STX $80 ; JMP $F000
    let mut dbg = debugger(&[0xE8, 0x86, 0x80, 0x4C, 0x00, 0xF0]);
    assert_eq!(dbg.add_watch("*$80").unwrap(), 0);
    assert_eq!(dbg.add_watch("x * 2").unwrap(), 1);
    assert!(dbg.add_watch("x +").is_err());
    assert_eq!(dbg.watches().collect::<Vec<_>>(), vec!["*$80", "x * 2"]);

    dbg.step().unwrap();
    let values = dbg.watch_values();
    assert_eq!(values[0].value, Some(0));
    assert!(!values[0].changed);
    assert_eq!(values[1].value, Some(2));
    assert!(values[1].changed);

    dbg.step().unwrap();
    let values = dbg.watch_values();
    assert_eq!(values[0].value, Some(1));
    assert!(values[0].changed);
    assert!(!values[1].changed);
    assert_eq!(
        dbg.show_watches(),
        "watch #0: *$80 = $01 #1 (changed)\nwatch #1: x * 2 = $02 #2\n"
    );

    assert_eq!(dbg.del_watch(0).unwrap(), "*$80");
    assert_eq!(dbg.del_watch(4), Err(DebuggerError::NoSuchWatch(4)));
    dbg.clear_watches();
    assert!(dbg.show_watches().is_empty());
}

#[test]
fn test_unevaluable_watch_reports_no_value() {
    let mut dbg = debugger(&COUNT_X);
    dbg.add_function("lives", "*$80").unwrap();
    dbg.add_watch("lives").unwrap();
    dbg.del_function("lives").unwrap();

    dbg.step().unwrap();
    let values = dbg.watch_values();
    assert_eq!(values[0].value, None);
    assert!(values[0].changed);
    assert_eq!(values[0].to_string(), "lives = ? (changed)");
}

use motorola_68040::frame::{WB_VALID, ssw030, ssw040};
use motorola_68040::{Cpu, CpuError, CpuModel, FlatBus, FpuModel};

const STACK: u32 = 0x8000;
const HANDLER: u32 = 0x3000;
const ROOT: u32 = 0xC000;
const POINTER: u32 = 0xC200;
const PAGES: u32 = 0xC400;

/// 4K identity map of the first 64K, except logical page 1 which maps to
/// physical 0x2000 read-only.
fn page_tables(bus: &mut FlatBus) {
    bus.poke32(ROOT, POINTER | 2);
    bus.poke32(POINTER, PAGES | 2);
    for page in 0..16 {
        bus.poke32(PAGES + page * 4, (page << 12) | 1);
    }
    bus.poke32(PAGES + 4, 0x2000 | 0x4 | 1);
}

fn machine(program: &[u16]) -> FlatBus {
    let mut bus = FlatBus::new(0x1_0000);
    bus.poke32(0, STACK);
    bus.poke32(4, 0x400);
    bus.poke32(2 * 4, HANDLER);
    bus.load_words(0x400, program);
    bus
}

fn boot(model: CpuModel, fpu: FpuModel, bus: &mut FlatBus) -> Cpu {
    let mut cpu = Cpu::new(model, fpu).unwrap();
    cpu.reset(bus).unwrap();
    cpu
}

#[test]
fn m68040_write_to_read_only_page_builds_format_7() {
    let mut bus = machine(&[
        0x4E7B, 0x0806, // MOVEC D0,URP
        0x4E7B, 0x0807, // MOVEC D0,SRP
        0x4E7B, 0x1003, // MOVEC D1,TC
        0x2082, // MOVE.L D2,(A0)
    ]);
    page_tables(&mut bus);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.regs.d[0] = ROOT;
    cpu.regs.d[1] = 0x8000;
    cpu.regs.d[2] = 0x1234_5678;
    cpu.regs.a[0] = 0x1000;
    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }

    assert_eq!(cpu.regs.pc, HANDLER);
    let sp = cpu.regs.a(7);
    assert_eq!(sp, STACK - 60);
    let format_vector = bus.peek16(sp + 6);
    assert_eq!(format_vector >> 12, 7);
    assert_eq!((format_vector & 0x0FFF) >> 2, 2);
    let ssw = bus.peek16(sp + 12);
    assert_eq!(ssw & ssw040::RW, 0, "write access");
    assert_ne!(ssw & ssw040::ATC, 0);
    assert_eq!(bus.peek32(sp + 20), 0x1000);
    // the write is pending in WB3
    assert_ne!(bus.peek16(sp + 14) & WB_VALID, 0);
    assert_eq!(bus.peek32(sp + 24), 0x1000);
    assert_eq!(bus.peek32(sp + 28), 0x1234_5678);
    // physical page behind the fault is untouched
    assert_eq!(bus.peek32(0x2000), 0);
}

#[test]
fn m68030_write_to_read_only_page_builds_format_a() {
    let mut bus = machine(&[
        0xF011, 0x4C00, // PMOVE (A1),CRP
        0xF012, 0x4000, // PMOVE (A2),TC
        0x2082, // MOVE.L D2,(A0)
    ]);
    page_tables(&mut bus);
    bus.poke32(0x5000, 0x7FFF_0002);
    bus.poke32(0x5004, ROOT);
    bus.poke32(0x5008, 0x80C0_7760);
    let mut cpu = boot(CpuModel::M68030, FpuModel::M68882, &mut bus);
    cpu.regs.a[0] = 0x1000;
    cpu.regs.a[1] = 0x5000;
    cpu.regs.a[2] = 0x5008;
    cpu.regs.d[2] = 0xCAFE_F00D;
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }

    assert_eq!(cpu.regs.pc, HANDLER);
    let sp = cpu.regs.a(7);
    assert_eq!(sp, STACK - 32);
    assert_eq!(bus.peek16(sp + 6) >> 12, 0xA);
    let ssw = bus.peek16(sp + 0x0A);
    assert_eq!(ssw & ssw030::RW, 0, "write access");
    assert_ne!(ssw & ssw030::DF, 0);
    assert_eq!(bus.peek32(sp + 0x10), 0x1000);
    assert_eq!(bus.peek32(sp + 0x18), 0xCAFE_F00D);
}

#[test]
fn m68030_read_bus_error_builds_format_b() {
    // MOVE.L (A0),D0 past the end of memory
    let mut bus = machine(&[0x2010]);
    let mut cpu = boot(CpuModel::M68030, FpuModel::None, &mut bus);
    cpu.regs.a[0] = 0x0002_0000;
    cpu.step(&mut bus).unwrap();
    let sp = cpu.regs.a(7);
    assert_eq!(sp, STACK - 92);
    assert_eq!(bus.peek16(sp + 6) >> 12, 0xB);
    assert_ne!(bus.peek16(sp + 0x0A) & ssw030::RW, 0);
    assert_eq!(bus.peek32(sp + 0x10), 0x0002_0000);
    // restarted instruction
    assert_eq!(bus.peek32(sp + 2), 0x400);
}

#[test]
fn identical_faults_give_identical_frames() {
    let run = || {
        let mut bus = machine(&[0x2010]);
        let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
        cpu.regs.a[0] = 0x0002_0000;
        cpu.step(&mut bus).unwrap();
        let sp = cpu.regs.a(7);
        (0..60).step_by(2).map(|i| bus.peek16(sp + i)).collect::<Vec<_>>()
    };
    let first = run();
    assert_eq!(first[3] >> 12, 7);
    assert_eq!(first, run());
}

#[test]
fn fault_while_stacking_a_bus_error_halts() {
    // MOVE.L (A0),D0 with both the operand and the stack out of range
    let mut bus = machine(&[0x2010]);
    bus.poke32(0, 0x0002_0000);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.regs.a[0] = 0x0003_0000;
    let err = cpu.step(&mut bus).unwrap_err();
    assert!(matches!(err, CpuError::DoubleFault { vector: 2, pc: 0x400, .. }));
    assert!(cpu.is_halted());

    let executed = cpu.instructions();
    assert!(matches!(cpu.step(&mut bus), Err(CpuError::Halted)));
    assert_eq!(cpu.instructions(), executed);

    bus.poke32(0, STACK);
    cpu.reset(&mut bus).unwrap();
    assert!(!cpu.is_halted());
    assert_eq!(cpu.regs.pc, 0x400);
}

#[test]
fn rte_completes_the_pending_write() {
    // fault on MOVE.L D2,(A0), handler maps the page writable, flushes, RTEs
    let mut bus = machine(&[
        0x4E7B, 0x0806, // MOVEC D0,URP
        0x4E7B, 0x0807, // MOVEC D0,SRP
        0x4E7B, 0x1003, // MOVEC D1,TC
        0x2082, // MOVE.L D2,(A0)
        0x4E71, // NOP
    ]);
    bus.load_words(
        HANDLER,
        &[
            0x23FC, 0x0000, 0x2001, 0x0000, 0xC404, // MOVE.L #$2001,$C404
            0xF518, // PFLUSHA
            0x4E73, // RTE
        ],
    );
    page_tables(&mut bus);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.regs.d[0] = ROOT;
    cpu.regs.d[1] = 0x8000;
    cpu.regs.d[2] = 0x0BAD_CAFE;
    cpu.regs.a[0] = 0x1000;
    for _ in 0..7 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(bus.peek32(0x2000), 0x0BAD_CAFE);
    assert_eq!(cpu.regs.pc, 0x40E);
    assert_eq!(cpu.regs.a(7), STACK);
}

/// MOVE.L #$2001,$C404 ; PFLUSHA ; RTE: page 1 becomes writable and the
/// faulting instruction gets another go.
const UNPROTECT_PAGE_1: [u16; 7] = [0x23FC, 0x0000, 0x2001, 0x0000, 0xC404, 0xF518, 0x4E73];

/// 68040 with paging switched on; `program` starts at 0x40C.
fn paged(program: &[u16]) -> (Cpu, FlatBus) {
    let mut words = vec![
        0x4E7B, 0x0806, // MOVEC D0,URP
        0x4E7B, 0x0807, // MOVEC D0,SRP
        0x4E7B, 0x1003, // MOVEC D1,TC
    ];
    words.extend_from_slice(program);
    let mut bus = machine(&words);
    bus.load_words(HANDLER, &UNPROTECT_PAGE_1);
    page_tables(&mut bus);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.regs.d[0] = ROOT;
    cpu.regs.d[1] = 0x8000;
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    (cpu, bus)
}

#[test]
fn jsr_with_a_faulting_push_reruns_the_call() {
    // JSR $500 from user mode with the user stack in the read-only page
    let (mut cpu, mut bus) = paged(&[0x4EB9, 0x0000, 0x0500]);
    cpu.regs.sr = 0x0000;
    cpu.regs.usp = 0x1800;
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER);
    let sp = cpu.regs.a(7);
    assert_eq!(bus.peek32(sp + 2), 0x40C, "frame restarts the JSR");
    assert_eq!(bus.peek16(sp + 14) & WB_VALID, 0);
    assert_eq!(cpu.regs.usp, 0x1800);

    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.regs.pc, 0x500);
    assert_eq!(cpu.regs.usp, 0x17FC);
    assert_eq!(bus.peek32(0x27FC), 0x412);
}

#[test]
fn bsr_with_a_faulting_push_reruns_the_call() {
    // BSR.W to $500 from user mode with the user stack in the read-only page
    let (mut cpu, mut bus) = paged(&[0x6100, 0x00F2]);
    cpu.regs.sr = 0x0000;
    cpu.regs.usp = 0x1800;
    for _ in 0..5 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.regs.pc, 0x500);
    assert_eq!(cpu.regs.usp, 0x17FC);
    assert_eq!(bus.peek32(0x27FC), 0x410);
}

#[test]
fn link_with_a_faulting_push_reruns_the_link() {
    // LINK A6,#-8 from user mode with the user stack in the read-only page
    let (mut cpu, mut bus) = paged(&[0x4E56, 0xFFF8]);
    cpu.regs.sr = 0x0000;
    cpu.regs.usp = 0x1800;
    cpu.regs.a[6] = 0x1111_2222;
    for _ in 0..5 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.regs.pc, 0x410);
    assert_eq!(cpu.regs.a[6], 0x17FC);
    assert_eq!(cpu.regs.usp, 0x17F4);
    assert_eq!(bus.peek32(0x27FC), 0x1111_2222);
}

#[test]
fn page_crossing_write_is_all_or_nothing() {
    // MOVE.L D2,(A0) ; NOP with the long straddling pages 0 and 1
    let (mut cpu, mut bus) = paged(&[0x2082, 0x4E71]);
    cpu.regs.a[0] = 0x0FFE;
    cpu.regs.d[2] = 0x0BAD_CAFE;
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER);
    let sp = cpu.regs.a(7);
    assert_eq!(bus.peek32(sp + 2), 0x40C);
    assert_eq!(bus.peek32(sp + 20), 0x1000, "fault address is the refusing page");
    assert_eq!(bus.peek16(sp + 14) & WB_VALID, 0);
    assert_eq!(bus.peek16(0x0FFE), 0, "no byte stored before the fault");

    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.regs.pc, 0x40E);
    assert_eq!(bus.peek16(0x0FFE), 0x0BAD);
    assert_eq!(bus.peek16(0x2000), 0xCAFE);
}

#[test]
fn m68030_fault_frames_stack_the_instruction_pipe() {
    // MOVE.L $20000,D0 past the end of memory
    let mut bus = machine(&[0x2039, 0x0002, 0x0000]);
    let mut cpu = boot(CpuModel::M68030, FpuModel::None, &mut bus);
    cpu.step(&mut bus).unwrap();
    let sp = cpu.regs.a(7);
    assert_eq!(bus.peek16(sp + 6) >> 12, 0xB);
    assert_eq!(bus.peek16(sp + 0x0C), 0x2039);
    assert_eq!(bus.peek16(sp + 0x0E), 0x0002);
}

#[test]
fn master_mode_interrupt_leaves_a_throwaway_frame() {
    let mut bus = machine(&[0x4E71]);
    bus.poke32(27 * 4, HANDLER);
    bus.load_words(HANDLER, &[0x4E73]); // RTE
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.regs.sr = 0x3000;
    cpu.regs.msp = 0x6000;
    cpu.set_ipl(3);
    cpu.step(&mut bus).unwrap();

    assert_eq!(cpu.regs.pc, HANDLER);
    assert_eq!(cpu.regs.sr, 0x2300, "M cleared");
    assert_eq!(cpu.regs.msp, 0x5FF8);
    assert_eq!(bus.peek16(0x5FF8), 0x3000);
    assert_eq!(bus.peek32(0x5FFA), 0x400);
    assert_eq!(bus.peek16(0x5FFE), 0x006C);
    assert_eq!(cpu.regs.isp, STACK - 8);
    assert_eq!(bus.peek16(STACK - 8), 0x3300);
    assert_eq!(bus.peek16(STACK - 2), 0x106C);

    // RTE drops the throwaway frame and unwinds the master stack
    cpu.set_ipl(0);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, 0x400);
    assert_eq!(cpu.regs.sr, 0x3000);
    assert_eq!(cpu.regs.msp, 0x6000);
    assert_eq!(cpu.regs.isp, STACK);
}

#[test]
fn trace_after_trap_fires_after_the_first_handler_instruction() {
    // TRAP #0 traced; the handler starts with a NOP
    let mut bus = machine(&[0x4E40]);
    bus.poke32(32 * 4, HANDLER);
    bus.poke32(9 * 4, 0x3100);
    bus.load_words(HANDLER, &[0x4E71, 0x4E71]);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.regs.sr = 0xA700;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER);
    assert!(!cpu.trace_pending());
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER + 2);
    assert!(cpu.trace_pending());
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, 0x3100);
    let sp = cpu.regs.a(7);
    assert_eq!(bus.peek16(sp + 6), 0x2024);
    assert_eq!(bus.peek32(sp + 2), HANDLER + 2);
}

#[test]
fn odd_handler_address_raises_one_address_error() {
    // ILLEGAL with vector 4 pointing at an odd address
    let mut bus = machine(&[0x4AFC]);
    bus.poke32(4 * 4, 0x3001);
    bus.poke32(3 * 4, 0x3100);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    cpu.step(&mut bus).unwrap();

    assert!(!cpu.is_halted());
    assert_eq!(cpu.regs.pc, 0x3100);
    let sp = cpu.regs.a(7);
    assert_eq!(sp, STACK - 8 - 12);
    assert_eq!(bus.peek16(sp + 6), 0x200C);
    assert_eq!(bus.peek32(sp + 8), 0x3001);
    // the illegal-instruction frame underneath
    assert_eq!(bus.peek16(sp + 12 + 6), 0x0010);
    assert_eq!(bus.peek32(sp + 12 + 2), 0x400);
}

#[test]
fn level_7_is_edge_triggered_under_mask_7() {
    let mut bus = machine(&[0x4E71]);
    bus.poke32(31 * 4, HANDLER);
    bus.load_words(HANDLER, &[0x4E71, 0x4E71, 0x4E71]);
    let mut cpu = boot(CpuModel::M68040, FpuModel::Internal, &mut bus);
    assert_eq!(cpu.regs.sr & 0x0700, 0x0700);

    cpu.set_ipl(7);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER);
    assert_eq!(bus.peek16(STACK - 2), 0x007C);

    // still asserted: no new edge, the handler runs
    cpu.set_ipl(7);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER + 2);
    assert_eq!(cpu.regs.a(7), STACK - 8);

    cpu.set_ipl(0);
    cpu.set_ipl(7);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.regs.pc, HANDLER);
    assert_eq!(cpu.regs.a(7), STACK - 16);
}

use super::*;
use crate::Cpu;

const ENTRY: u32 = 0x1000;
const STACK: u32 = 0x8000;
const HANDLER: u32 = 0x2000;

const NOP: u16 = 0x0009;

fn make_cpu(program: &[u16]) -> CpuSh2<ArrayMemory> {
    let mut memory = ArrayMemory::new();
    memory.load_program(ENTRY, program);
    let mut cpu = CpuSh2::new(memory);
    cpu.boot_at(ENTRY, STACK);
    cpu
}

/// Execute `count` instructions.
fn run(cpu: &mut CpuSh2<ArrayMemory>, count: usize) {
    for _ in 0..count {
        cpu.step();
    }
}

fn install_vector(cpu: &mut CpuSh2<ArrayMemory>, vector: u32, target: u32) {
    let addr = cpu.vbr + vector * 4;
    cpu.memory.write_word(addr, target);
}

#[test]
fn test_mov_imm_sign_extends_and_add() {
    let mut cpu = make_cpu(&[
        0xE105, // MOV #5,R1
        0xE2FD, // MOV #-3,R2
        0x312C, // ADD R2,R1
    ]);
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[2], 0xFFFF_FFFD);
    assert_eq!(cpu.gpr[1], 2);
}

#[test]
fn test_addv_overflow() {
    let cases = [
        (0x7FFF_FFFF, 1, 0x8000_0000, true),
        (1, 1, 2, false),
        (0xFFFF_FFFF, 1, 0, false),
        (0x8000_0000, 0xFFFF_FFFF, 0x7FFF_FFFF, true),
    ];
    for (a, b, result, overflow) in cases {
        let mut cpu = make_cpu(&[0x312F]); // ADDV R2,R1
        cpu.gpr[1] = a;
        cpu.gpr[2] = b;
        run(&mut cpu, 1);
        assert_eq!(cpu.gpr[1], result, "{:08X}+{:08X}", a, b);
        assert_eq!(cpu.t(), overflow, "{:08X}+{:08X}", a, b);
    }
}

#[test]
fn test_subv_overflow() {
    let mut cpu = make_cpu(&[0x312B]); // SUBV R2,R1
    cpu.gpr[1] = 0x8000_0000;
    cpu.gpr[2] = 1;
    run(&mut cpu, 1);
    assert_eq!(cpu.gpr[1], 0x7FFF_FFFF);
    assert!(cpu.t());
}

#[test]
fn test_addc_and_subc_carry() {
    let mut cpu = make_cpu(&[
        0x0018, // SETT
        0x312E, // ADDC R2,R1
    ]);
    cpu.gpr[1] = 0xFFFF_FFFF;
    run(&mut cpu, 2);
    assert_eq!(cpu.gpr[1], 0);
    assert!(cpu.t());

    let mut cpu = make_cpu(&[
        0x0008, // CLRT
        0x312A, // SUBC R2,R1
    ]);
    cpu.gpr[2] = 1;
    run(&mut cpu, 2);
    assert_eq!(cpu.gpr[1], 0xFFFF_FFFF);
    assert!(cpu.t());
}

#[test]
fn test_negc() {
    let mut cpu = make_cpu(&[
        0x0008, // CLRT
        0x612A, // NEGC R2,R1
    ]);
    cpu.gpr[2] = 1;
    run(&mut cpu, 2);
    assert_eq!(cpu.gpr[1], 0xFFFF_FFFF);
    assert!(cpu.t());
}

#[test]
fn test_unsigned_division_sequence() {
    let mut program = vec![
        0x4028, // SHLL16 R0
        0x0019, // DIV0U
    ];
    program.extend(std::iter::repeat(0x3104).take(16)); // DIV1 R0,R1
    program.push(0x4124); // ROTCL R1
    program.push(0x611D); // EXTU.W R1,R1

    for (dividend, divisor) in [(1000u32, 7u32), (65535, 3), (0, 5), (5000, 1)] {
        let mut cpu = make_cpu(&program);
        cpu.gpr[0] = divisor;
        cpu.gpr[1] = dividend;
        run(&mut cpu, program.len());
        assert_eq!(cpu.gpr[1], dividend / divisor, "{} / {}", dividend, divisor);
    }
}

#[test]
fn test_tas_sets_high_bit() {
    let mut cpu = make_cpu(&[0x411B]); // TAS.B @R1
    cpu.gpr[1] = 0x6000;
    run(&mut cpu, 1);
    assert!(cpu.t());
    assert_eq!(cpu.memory.read_byte(0x6000), 0x80);
}

#[test]
fn test_mac_w_sign_extends_accumulator() {
    let mut cpu = make_cpu(&[
        0x0028, // CLRMAC
        0x412F, // MAC.W @R2+,@R1+
    ]);
    cpu.gpr[1] = 0x6000;
    cpu.gpr[2] = 0x6100;
    cpu.memory.write_halfword(0x6000, 3);
    cpu.memory.write_halfword(0x6100, 0xFFFE);
    run(&mut cpu, 2);
    assert_eq!(cpu.macl, 0xFFFF_FFFA);
    assert_eq!(cpu.mach, 0xFFFF_FFFF);
    assert_eq!(cpu.gpr[1], 0x6002);
    assert_eq!(cpu.gpr[2], 0x6102);
}

#[test]
fn test_mac_w_saturates_with_s_flag() {
    let mut cpu = make_cpu(&[0x412F]); // MAC.W @R2+,@R1+
    cpu.set_sr(cpu.sr() | SR_S);
    cpu.macl = 0x7FFF_FFF0;
    cpu.gpr[1] = 0x6000;
    cpu.gpr[2] = 0x6100;
    cpu.memory.write_halfword(0x6000, 0x100);
    cpu.memory.write_halfword(0x6100, 0x100);
    run(&mut cpu, 1);
    assert_eq!(cpu.macl, 0x7FFF_FFFF);
    assert_eq!(cpu.mach & 1, 1);
}

#[test]
fn test_dmuls_l() {
    let mut cpu = make_cpu(&[0x312D]); // DMULS.L R2,R1
    cpu.gpr[1] = 0xFFFF_FFFE;
    cpu.gpr[2] = 3;
    run(&mut cpu, 1);
    assert_eq!(cpu.mach, 0xFFFF_FFFF);
    assert_eq!(cpu.macl, 0xFFFF_FFFA);
}

#[test]
fn test_predecrement_store_of_index_register() {
    let mut cpu = make_cpu(&[0x2116]); // MOV.L R1,@-R1
    cpu.gpr[1] = 0x7000;
    run(&mut cpu, 1);
    assert_eq!(cpu.gpr[1], 0x6FFC);
    assert_eq!(cpu.memory.read_word(0x6FFC), 0x7000);
}

#[test]
fn test_postincrement_load_into_index_register() {
    let mut cpu = make_cpu(&[
        0x6216, // MOV.L @R1+,R2
        0x6116, // MOV.L @R1+,R1
    ]);
    cpu.gpr[1] = 0x6000;
    cpu.memory.write_word(0x6000, 0xCAFE_BABE);
    cpu.memory.write_word(0x6004, 0x1234_5678);
    run(&mut cpu, 2);
    assert_eq!(cpu.gpr[2], 0xCAFE_BABE);
    assert_eq!(cpu.gpr[1], 0x1234_5678);
}

#[test]
fn test_pc_relative_loads() {
    let mut cpu = make_cpu(&[
        0x0009, // NOP
        0xD101, // MOV.L @(1,PC),R1  -> (0x1006 & !3) + 4 = 0x1008
        0xC701, // MOVA @(1,PC),R0   -> (0x1008 & !3) + 4 = 0x100C
    ]);
    cpu.memory.write_word(0x1008, 0xDEAD_BEEF);
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[1], 0xDEAD_BEEF);
    assert_eq!(cpu.gpr[0], 0x100C);
}

#[test]
fn test_delay_slot_executes_before_branch_target() {
    let mut memory_program = vec![NOP; 0x20];
    memory_program[0] = 0xA006; // BRA 0x1010
    memory_program[1] = 0xE001; // MOV #1,R0 (slot)
    memory_program[2] = 0xE002; // MOV #2,R0 (skipped)
    memory_program[8] = 0xE303; // MOV #3,R3 at 0x1010
    let mut cpu = make_cpu(&memory_program);
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[0], 1);
    assert_eq!(cpu.gpr[3], 3);
}

#[test]
fn test_bsr_and_rts() {
    let mut program = vec![NOP; 0x20];
    program[0] = 0xB006; // BSR 0x1010
    program[1] = NOP;
    program[2] = 0xE505; // MOV #5,R5 after return
    program[8] = 0x000B; // RTS
    program[9] = 0xE404; // MOV #4,R4 (slot)
    let mut cpu = make_cpu(&program);
    run(&mut cpu, 2);
    assert_eq!(cpu.pr, 0x1004);
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[4], 4);
    assert_eq!(cpu.gpr[5], 5);
}

#[test]
fn test_dt_loop() {
    let mut cpu = make_cpu(&[
        0x4110, // DT R1
        0x8BFD, // BF back to DT
        0xE701, // MOV #1,R7
    ]);
    cpu.gpr[1] = 3;
    run(&mut cpu, 7);
    assert_eq!(cpu.gpr[1], 0);
    assert_eq!(cpu.gpr[7], 1);
}

#[test]
fn test_branch_in_delay_slot_is_slot_illegal() {
    let mut cpu = make_cpu(&[
        0xA006, // BRA
        0xA006, // BRA in the slot
    ]);
    install_vector(&mut cpu, VECTOR_SLOT_ILLEGAL, HANDLER);
    cpu.memory.write_halfword(HANDLER, 0xE707); // MOV #7,R7
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[7], 7);
    assert_eq!(cpu.gpr[15], STACK - 8);
    assert_eq!(cpu.memory.read_word(STACK - 4), SR_IMASK);
}

#[test]
fn test_illegal_instruction_traps() {
    let mut cpu = make_cpu(&[0x0000]);
    install_vector(&mut cpu, VECTOR_GENERAL_ILLEGAL, HANDLER);
    cpu.memory.write_halfword(HANDLER, 0xE707); // MOV #7,R7
    run(&mut cpu, 2);
    assert_eq!(cpu.gpr[7], 7);
    assert_eq!(cpu.memory.read_word(STACK - 8), ENTRY);
    assert_eq!(
        cpu.take_fault(),
        Some(CpuFault::IllegalInstruction {
            addr: ENTRY,
            opcode: 0x0000
        })
    );
    assert!(cpu.fault().is_none());
}

#[test]
fn test_invalid_control_register_index() {
    let mut cpu = make_cpu(&[0x0132]); // STC with control index 3
    install_vector(&mut cpu, VECTOR_GENERAL_ILLEGAL, HANDLER);
    run(&mut cpu, 1);
    assert!(matches!(
        cpu.fault(),
        Some(CpuFault::InvalidRegisterIndex {
            kind: "control",
            index: 3,
            ..
        })
    ));
    assert_eq!(cpu.memory.read_word(STACK - 8), ENTRY);
}

#[test]
fn test_trapa_and_rte_round_trip() {
    let mut cpu = make_cpu(&[
        0xC320, // TRAPA #0x20
        0xE909, // MOV #9,R9
    ]);
    cpu.vbr = 0x4000;
    install_vector(&mut cpu, 0x20, 0x3000);
    cpu.memory.load_program(0x3000, &[0x002B, NOP]); // RTE; NOP
    run(&mut cpu, 1);
    assert_eq!(cpu.memory.read_word(STACK - 8), ENTRY + 2);
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[9], 9);
    assert_eq!(cpu.gpr[15], STACK);
    assert_eq!(cpu.sr(), SR_IMASK);
}

#[test]
fn test_interrupt_above_mask_is_accepted() {
    let mut cpu = make_cpu(&[NOP; 8]);
    cpu.set_sr(0x30);
    install_vector(&mut cpu, 64, HANDLER);
    cpu.memory.write_halfword(HANDLER, 0xE101); // MOV #1,R1
    cpu.assert_irq(64, 5);
    run(&mut cpu, 1);
    assert_eq!(cpu.gpr[1], 1);
    assert_eq!(cpu.imask(), 5);
    assert_eq!(cpu.memory.read_word(STACK - 8), ENTRY);
    assert_eq!(cpu.memory.read_word(STACK - 4), 0x30);
    assert!(cpu.pending_exception().is_none());
}

#[test]
fn test_interrupt_at_mask_waits_for_mask_to_drop() {
    let mut program = vec![NOP; 16];
    program[4] = 0xE000; // MOV #0,R0
    program[5] = 0x400E; // LDC R0,SR
    let mut cpu = make_cpu(&program);
    cpu.set_sr(0x30);
    install_vector(&mut cpu, 64, HANDLER);
    cpu.memory.load_program(HANDLER, &[0xE101, NOP, NOP, NOP]);
    cpu.assert_irq(64, 3);

    run(&mut cpu, 4);
    assert!(cpu.pending_exception().is_some());
    assert_eq!(cpu.gpr[1], 0);

    // MOV, LDC, then one more instruction in the no-interrupt slot
    run(&mut cpu, 3);
    assert_eq!(cpu.imask(), 0);
    assert!(cpu.pending_exception().is_some());
    run(&mut cpu, 1);
    assert_eq!(cpu.gpr[1], 1);
    assert_eq!(cpu.imask(), 3);
}

#[test]
fn test_higher_priority_request_replaces_lower() {
    let mut cpu = make_cpu(&[NOP]);
    cpu.assert_irq(64, 3);
    cpu.assert_irq(65, 7);
    cpu.assert_irq(66, 5);
    let pending = cpu.pending_exception().expect("pending");
    assert_eq!(pending.vector, 65);
    assert_eq!(pending.priority, 7);
}

#[test]
fn test_sleep_until_interrupt() {
    let mut cpu = make_cpu(&[
        0x001B, // SLEEP
        0xE101, // MOV #1,R1
    ]);
    cpu.set_sr(0);
    install_vector(&mut cpu, 64, HANDLER);
    cpu.memory.write_halfword(HANDLER, 0xE202); // MOV #2,R2
    run(&mut cpu, 1);
    assert!(cpu.is_sleeping());
    for _ in 0..16 {
        assert!(!cpu.clock());
    }
    assert_eq!(cpu.gpr[1], 0);

    cpu.assert_irq(64, 1);
    run(&mut cpu, 1);
    assert!(!cpu.is_sleeping());
    assert_eq!(cpu.gpr[2], 2);
    assert_eq!(cpu.memory.read_word(STACK - 8), ENTRY + 2);
}

#[test]
fn test_power_on_reads_vectors() {
    let mut memory = ArrayMemory::new();
    memory.write_word(0, 0x0000_1000);
    memory.write_word(4, 0x0000_8000);
    let mut cpu = CpuSh2::new(memory);
    cpu.vbr = 0x1234;
    cpu.reset();
    cpu.power_on();
    assert_eq!(cpu.pc, 0x1000);
    assert_eq!(cpu.gpr[15], 0x8000);
    assert_eq!(cpu.vbr, 0);
    assert_eq!(cpu.imask(), 0xF);
}

fn hook_suppress(cpu: &mut CpuSh2<ArrayMemory>, _addr: u32) -> bool {
    cpu.gpr[5] = 0x55;
    true
}

fn hook_replace(cpu: &mut CpuSh2<ArrayMemory>, _addr: u32) -> bool {
    cpu.gpr[5] = 0x66;
    true
}

fn hook_redirect(cpu: &mut CpuSh2<ArrayMemory>, _addr: u32) -> bool {
    cpu.jump_to(0x1100);
    false
}

#[test]
fn test_hook_suppresses_instruction() {
    let mut cpu = make_cpu(&[NOP, 0xE601, NOP]); // MOV #1,R6 hooked
    cpu.add_hook(ENTRY + 2, hook_suppress);
    run(&mut cpu, 3);
    assert_eq!(cpu.gpr[5], 0x55);
    assert_eq!(cpu.gpr[6], 0);
}

#[test]
fn test_second_hook_at_same_address_wins() {
    let mut cpu = make_cpu(&[NOP, NOP]);
    cpu.add_hook(ENTRY, hook_suppress);
    cpu.add_hook(ENTRY, hook_replace);
    run(&mut cpu, 1);
    assert_eq!(cpu.gpr[5], 0x66);

    cpu.remove_hook(ENTRY);
    assert!(!cpu.has_hook(ENTRY));
}

#[test]
fn test_hook_redirect_skips_hooked_instruction() {
    let mut cpu = make_cpu(&[0xE601, NOP]); // MOV #1,R6 hooked
    cpu.memory.load_program(0x1100, &[0xE202, NOP]);
    cpu.add_hook(ENTRY, hook_redirect);
    run(&mut cpu, 2);
    assert_eq!(cpu.gpr[6], 0);
    assert_eq!(cpu.gpr[2], 2);
}

#[test]
fn test_wait_states_stretch_fetch() {
    let mut cpu = make_cpu(&[NOP; 8]);
    cpu.memory.wait = 2;
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.step(), 2);

    let mut cpu = make_cpu(&[NOP; 8]);
    assert_eq!(cpu.step(), 2);
    assert_eq!(cpu.step(), 1);
}

#[test]
fn test_snapshot_restore() {
    let mut cpu = make_cpu(&[0xE17F, NOP, NOP]);
    run(&mut cpu, 1);
    let state = cpu.snapshot();
    assert_eq!(state.gpr[1], 0x7F);

    let mut other = make_cpu(&[NOP]);
    other.restore(&state);
    assert_eq!(other.gpr[1], 0x7F);
    assert_eq!(other.pc, state.pc);
    assert_eq!(other.sr(), state.sr);
}

mod common;

use common::*;
use sim_lib::config::SimConfig;
use sim_lib::error::{ExecutionError, MemoryError, SimulatorError};
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::pipelined::Machine;
use sim_lib::run_wrapper;
use sim_lib::system_call::BufferHost;

fn run_with(
    asm: &Asm,
    config: &SimConfig,
    heuristic: PredictorHeuristic,
    host: BufferHost,
) -> Machine<BufferHost> {
    let file = write_program(asm);
    let mut machine = Machine::with_host(config, heuristic, host).unwrap();
    machine.load_elf(file.path()).unwrap();
    machine.run().unwrap();
    machine
}

fn run(asm: &Asm) -> Machine<BufferHost> {
    run_with(asm, &SimConfig::default(), PredictorHeuristic::default(), BufferHost::default())
}

fn ackermann() -> Asm {
    let mut asm = Asm::new();
    asm.emit(addi(A0, ZERO, 2))
        .emit(addi(A1, ZERO, 2))
        .jal(RA, "ack")
        .syscall(89)
        .exit(0);

    // a0 = A(a0, a1)
    asm.label("ack")
        .bne(A0, ZERO, "m_nonzero")
        .emit(addi(A0, A1, 1))
        .emit(jalr(ZERO, RA, 0));
    asm.label("m_nonzero")
        .bne(A1, ZERO, "n_nonzero")
        .emit(addi(A0, A0, -1))
        .emit(addi(A1, ZERO, 1))
        .jal(ZERO, "ack");
    asm.label("n_nonzero")
        .emit_all(&[addi(SP, SP, -16), sd(RA, SP, 8), sd(A0, SP, 0), addi(A1, A1, -1)])
        .jal(RA, "ack")
        .emit_all(&[
            addi(A1, A0, 0),
            ld(A0, SP, 0),
            ld(RA, SP, 8),
            addi(SP, SP, 16),
            addi(A0, A0, -1),
        ])
        .jal(ZERO, "ack");
    asm
}

/// Sums 10 down to 1 and prints the total
fn counting_loop() -> Asm {
    let mut asm = Asm::new();
    asm.emit(addi(T0, ZERO, 10))
        .emit(addi(T1, ZERO, 0))
        .label("loop")
        .emit(add(T1, T1, T0))
        .emit(addi(T0, T0, -1))
        .bne(T0, ZERO, "loop")
        .emit(addi(A0, T1, 0))
        .syscall(89)
        .exit(0);
    asm
}

#[test]
fn test_ackermann() {
    for heuristic in PredictorHeuristic::ALL {
        let machine =
            run_with(&ackermann(), &SimConfig::default(), heuristic, BufferHost::default());
        assert_eq!(machine.host().output, "7\n", "{}", heuristic.name());
        assert_eq!(machine.cpu.exit_code, Some(0));
        assert_eq!(machine.cpu.history.syscall_count, 2);
        assert!(machine.cpu.history.control_hazard_count > 0);
    }
}

#[test]
fn test_exit_code_and_report() {
    let mut asm = Asm::new();
    asm.emit(addi(T0, ZERO, 1)).exit(5).emit_all(&[addi(ZERO, ZERO, 0); 4]);
    let file = write_program(&asm);

    let report = run_wrapper::run(
        file.path(),
        &SimConfig::default(),
        PredictorHeuristic::Bimodal,
        None,
        BufferHost::default(),
    )
    .unwrap();

    assert_eq!(report.exit_code, 5);
    assert_eq!(report.history.inst_count, 3);
    assert_eq!(report.history.syscall_count, 1);
    assert!(report.history.tick_count >= report.history.cycle_count);
    assert_eq!(report.caches.len(), 3);
    let text = report.to_string();
    assert!(text.contains("Branch Prediction: Bimodal"));
    assert!(text.contains("Exit code: 5"));
}

#[test]
fn test_loop_under_every_predictor() {
    let mut accuracy = Vec::new();
    for heuristic in PredictorHeuristic::ALL {
        let machine =
            run_with(&counting_loop(), &SimConfig::default(), heuristic, BufferHost::default());
        assert_eq!(machine.host().output, "55\n");
        let history = machine.cpu.history;
        assert_eq!(history.predict_success_count + history.predict_failure_count, 10);
        accuracy.push(history.prediction_accuracy());
    }
    // AT, ANT
    assert_eq!(accuracy[0], 0.9);
    assert!((accuracy[1] - 0.1).abs() < 1e-9);
    // Counters learn the backward branch
    assert!(accuracy[2] > accuracy[1]);
}

#[test]
fn test_arithmetic() {
    let mut asm = Asm::new();
    asm.emit_all(&[addi(T0, ZERO, 7), addi(T1, ZERO, 6), mul(A0, T0, T1)])
        .syscall(89)
        .emit_all(&[addi(T0, ZERO, -7), addi(T1, ZERO, 2), div(A0, T0, T1)])
        .syscall(89)
        .emit(rem(A0, T0, T1))
        .syscall(89)
        .emit(div(A0, T0, ZERO))
        .syscall(89)
        .emit_all(&[lui(T0, 0x80000), addiw(A0, T0, -1)])
        .syscall(89)
        .emit_all(&[addi(T0, ZERO, 1), slli(T0, T0, 62), addw(A0, T0, T0)])
        .syscall(89)
        .emit(sub(A0, ZERO, T1))
        .syscall(89)
        .exit(0);

    let machine = run(&asm);
    assert_eq!(machine.host().output, "42\n-3\n-1\n-1\n2147483647\n0\n-2\n");
}

#[test]
fn test_loads_and_stores() {
    let mut asm = Asm::new();
    asm.emit_all(&[addi(T0, ZERO, -2), sw(T0, SP, -8), lw(A0, SP, -8)])
        .syscall(89)
        .emit(lbu(A0, SP, -8))
        .syscall(89)
        // Reads back its own store through the dirty L1 line
        .emit_all(&[addi(T2, ZERO, 1234), sd(T2, SP, -16), addi(T2, ZERO, 0), ld(A0, SP, -16)])
        .syscall(89)
        .exit(0);

    let machine = run(&asm);
    assert_eq!(machine.host().output, "-2\n254\n1234\n");
    assert!(machine.mem.caches[0].stats().access_count > 0);
}

#[test]
fn test_read_and_print_string() {
    let mut asm = Asm::new();
    asm.syscall(92)
        .emit(addi(A0, A0, 1))
        .syscall(89)
        .emit_all(&[lui(A0, 0x10), addi(A0, A0, 0x200)])
        .syscall(91)
        .exit(0);

    let mut segment = asm.assemble();
    segment.resize(0x200, 0);
    segment.extend_from_slice(b"hello, world\0");
    let file = write_segment(&segment);

    let mut machine = Machine::with_host(
        &SimConfig::default(),
        PredictorHeuristic::AlwaysNotTaken,
        BufferHost::with_input([41]),
    )
    .unwrap();
    machine.load_elf(file.path()).unwrap();
    assert_eq!(machine.run().unwrap(), 0);
    assert_eq!(machine.host().output, "42\nhello, world\n");
}

#[test]
fn test_slower_memory_costs_ticks_not_cycles() {
    let fast = run(&counting_loop());
    let mut config = SimConfig::default();
    config.memory_latency.bus_latency = 200;
    let slow =
        run_with(&counting_loop(), &config, PredictorHeuristic::default(), BufferHost::default());

    assert_eq!(fast.cpu.history.cycle_count, slow.cpu.history.cycle_count);
    assert!(slow.cpu.history.tick_count > fast.cpu.history.tick_count);
}

#[test]
fn test_illegal_instruction_is_fatal() {
    let mut asm = Asm::new();
    asm.emit(addi(T0, ZERO, 1)).emit(0xffff_ffff).exit(0);
    let file = write_program(&asm);

    let mut machine = Machine::with_host(
        &SimConfig::default(),
        PredictorHeuristic::default(),
        BufferHost::default(),
    )
    .unwrap();
    machine.load_elf(file.path()).unwrap();
    assert!(matches!(
        machine.run(),
        Err(SimulatorError::InvalidInstructionError(0xffff_ffff, pc)) if pc == BASE + 4
    ));
}

#[test]
fn test_unmapped_load_is_fatal() {
    let mut asm = Asm::new();
    asm.emit_all(&[lui(T0, 0x50000), ld(A0, T0, 0)]).exit(0);
    let file = write_program(&asm);

    let mut machine = Machine::with_host(
        &SimConfig::default(),
        PredictorHeuristic::default(),
        BufferHost::default(),
    )
    .unwrap();
    machine.load_elf(file.path()).unwrap();
    assert!(matches!(machine.run(), Err(SimulatorError::MemoryError(_))));
}

#[test]
fn test_jump_to_unmapped_page_is_a_page_fault() {
    let mut asm = Asm::new();
    asm.emit_all(&[lui(T0, 0x50000), jalr(ZERO, T0, 0)]).exit(0);
    let file = write_program(&asm);

    let mut machine = Machine::with_host(
        &SimConfig::default(),
        PredictorHeuristic::default(),
        BufferHost::default(),
    )
    .unwrap();
    machine.load_elf(file.path()).unwrap();
    assert!(matches!(
        machine.run(),
        Err(SimulatorError::MemoryError(MemoryError::PageNotAllocated(0x5000_0000)))
    ));
    assert_eq!(machine.cpu.history.syscall_count, 0);
}

#[test]
fn test_fetch_faults_on_the_wrong_path_are_harmless() {
    // Never taken, but predicted into the unmapped page below the image
    let mut asm = Asm::new();
    asm.emit(bne_offset(ZERO, ZERO, -4096)).exit(3);
    let file = write_program(&asm);

    let mut machine = Machine::with_host(
        &SimConfig::default(),
        PredictorHeuristic::AlwaysTaken,
        BufferHost::default(),
    )
    .unwrap();
    machine.load_elf(file.path()).unwrap();
    assert_eq!(machine.run().unwrap(), 3);
    assert_eq!(machine.cpu.history.predict_failure_count, 1);
}

#[test]
fn test_cycle_limit() {
    let mut asm = Asm::new();
    asm.label("spin").jal(ZERO, "spin");
    let file = write_program(&asm);

    let result = run_wrapper::run(
        file.path(),
        &SimConfig::default(),
        PredictorHeuristic::default(),
        Some(1000),
        BufferHost::default(),
    );
    assert!(matches!(
        result,
        Err(SimulatorError::ExecutionError(ExecutionError::ExecutionLimitReached(1000)))
    ));
}

#[test]
fn test_missing_program() {
    let result = run_wrapper::run(
        "/nonexistent/program",
        &SimConfig::default(),
        PredictorHeuristic::default(),
        None,
        BufferHost::default(),
    );
    assert!(matches!(result, Err(SimulatorError::ElfLoadError(_))));
}

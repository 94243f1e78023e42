// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end conformance tests for the toolchain: assembler,
//! disassembler and interpreter driven through their public entry points.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pushdown::MachineError;
use pushdown::asm::{assemble, assemble_source};
use pushdown::disasm::{disassemble, disassemble_bytes};
use pushdown::console::Console;
use pushdown::opcode::{Op, OpByte, OperandKind};
use pushdown::ram::Ram;
use pushdown::reg::Register;
use pushdown::vm::{self, StackMachine, State};

#[derive(Debug, Default)]
struct ScriptedConsole {
    inputs: Vec<f64>,
    outputs: Vec<f64>,
}

impl Console for ScriptedConsole {
    fn input(&mut self) -> Option<f64> {
        if self.inputs.is_empty() {
            None
        } else {
            Some(self.inputs.remove(0))
        }
    }

    fn output(&mut self, value: f64) {
        self.outputs.push(value);
    }
}

fn machine_for(image: Vec<u8>, inputs: &[f64]) -> StackMachine<ScriptedConsole> {
    let console = ScriptedConsole {
        inputs: inputs.to_vec(),
        outputs: Vec::new(),
    };
    StackMachine::with_ram(image, console, Ram::with_latency(Duration::ZERO))
}

fn run_source(source: &str, inputs: &[f64]) -> Result<Vec<f64>, MachineError> {
    let image = assemble_source(source)?;
    let mut machine = machine_for(image, inputs);
    machine.run_to_halt()?;
    Ok(machine.into_console().outputs)
}

static NEXT_FILE: AtomicU32 = AtomicU32::new(0);

fn temp_path(tag: &str) -> PathBuf {
    let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("pushdown-conformance-{}-{n}-{tag}", process::id()))
}

// --- End-to-end scenarios ---

#[test]
fn scenario_add_prints_five() {
    let out = run_source("PUSH 2\nPUSH 3\nADD\nOUT\nHLT\n", &[]).unwrap();
    assert_eq!(out, vec![5.0]);
}

#[test]
fn scenario_sqrt_prints_three() {
    let out = run_source("PUSH 9\nSQRT\nOUT\nHLT\n", &[]).unwrap();
    assert_eq!(out, vec![3.0]);
}

#[test]
fn scenario_register_round_trip_prints_one() {
    let out = run_source("PUSH 1\nPOP AX\nPUSH AX\nOUT\nHLT\n", &[]).unwrap();
    assert_eq!(out, vec![1.0]);
}

#[test]
fn scenario_equal_branch_prints_one() {
    let source = "PUSH 5\nPUSH 5\nJMPE eq\nPUSH 0\nJMP end\neq:\nPUSH 1\nend:\nOUT\nHLT\n";
    assert_eq!(run_source(source, &[]).unwrap(), vec![1.0]);
}

#[test]
fn scenario_ram_overwrite_prints_seven() {
    let source = "PUSH 0\nPOP [10]\nPUSH 7\nPOP [10]\nPUSH [10]\nOUT\nHLT\n";
    assert_eq!(run_source(source, &[]).unwrap(), vec![7.0]);
}

#[test]
fn scenario_call_prints_forty_two() {
    let source = "CALL sub\nHLT\nsub:\nPUSH 42\nOUT\nRET\n";
    assert_eq!(run_source(source, &[]).unwrap(), vec![42.0]);
}

#[test]
fn scenario_pop_on_empty_stack_underflows() {
    assert_eq!(
        run_source("POP\nHLT\n", &[]),
        Err(MachineError::StackUnderflow)
    );
    assert_eq!(MachineError::StackUnderflow.sentinel(), 0xFD);
}

// --- Boundary behavior ---

#[test]
fn binary_op_on_single_element_underflows() {
    assert_eq!(
        run_source("PUSH 1\nADD\nHLT\n", &[]),
        Err(MachineError::StackUnderflow)
    );
}

#[test]
fn register_index_four_is_invalid() {
    let image = vec![Op::Push.byte() | 0x80, 4, Op::Hlt.byte()];
    let mut machine = machine_for(image, &[]);
    assert_eq!(
        machine.run_to_halt(),
        Err(MachineError::InvalidRegister)
    );
}

#[test]
fn ram_addresses_outside_memory_fault() {
    assert_eq!(
        run_source("PUSH [1024]\nHLT\n", &[]),
        Err(MachineError::InvalidRamAddress)
    );
    assert_eq!(
        run_source("PUSH 1\nPOP [-1]\nHLT\n", &[]),
        Err(MachineError::InvalidRamAddress)
    );
}

#[test]
fn sentinel_opcode_byte_is_invalid() {
    let mut machine = machine_for(vec![0xFF], &[]);
    assert_eq!(
        machine.run_to_halt(),
        Err(MachineError::InvalidOperation)
    );
}

#[test]
fn running_past_the_end_without_hlt_faults() {
    let image = assemble_source("PUSH 1\nPOP\n").unwrap();
    let mut machine = machine_for(image, &[]);
    assert_eq!(
        machine.run_to_halt(),
        Err(MachineError::InvalidOperation)
    );
}

#[test]
fn dangling_label_is_invalid() {
    assert_eq!(
        assemble_source("HLT\nend:\n"),
        Err(MachineError::InvalidLabel)
    );
}

#[test]
fn duplicate_label_is_invalid() {
    assert_eq!(
        assemble_source("a:\nHLT\na:\nHLT\n"),
        Err(MachineError::InvalidLabel)
    );
}

// --- Interpreter invariants ---

#[test]
fn pc_stays_inside_the_image_after_every_instruction() {
    let source = "CALL sub\nPUSH 5\nPUSH 4\nJMPG done\ndone:\nHLT\nsub:\nPUSH 42\nPOP\nRET\n";
    let image = assemble_source(source).unwrap();
    let len = image.len() as i32;
    let mut machine = machine_for(image, &[]);
    loop {
        let op = machine.process_next_operation().unwrap();
        assert!(machine.pc() >= 0 && machine.pc() <= len);
        if op == Op::Hlt {
            break;
        }
    }
    assert_eq!(machine.state(), State::Halted);
}

#[test]
fn call_and_ret_move_the_call_stack_by_one() {
    let source = "CALL sub\nHLT\nsub:\nRET\n";
    let image = assemble_source(source).unwrap();
    let mut machine = machine_for(image, &[]);

    assert_eq!(machine.process_next_operation(), Ok(Op::Call));
    assert_eq!(machine.call_depth(), 1);
    assert_eq!(machine.process_next_operation(), Ok(Op::Ret));
    assert_eq!(machine.call_depth(), 0);
    assert_eq!(machine.process_next_operation(), Ok(Op::Hlt));
}

#[test]
fn conditional_jumps_pop_exactly_two() {
    let source = "PUSH 1\nPUSH 2\nPUSH 3\nJMPL less\nless:\nHLT\n";
    let image = assemble_source(source).unwrap();
    let mut machine = machine_for(image, &[]);
    for _ in 0..3 {
        machine.process_next_operation().unwrap();
    }
    assert_eq!(machine.stack_depth(), 3);
    assert_eq!(machine.process_next_operation(), Ok(Op::Jmpl));
    assert_eq!(machine.stack_depth(), 1);
}

#[test]
fn ram_reads_return_the_last_write_bit_exact() {
    let source = "PUSH 0.1\nPOP [64]\nPUSH [64]\nOUT\nHLT\n";
    let out = run_source(source, &[]).unwrap();
    assert_eq!(out[0].to_bits(), 0.1_f64.to_bits());
}

#[test]
fn registers_survive_arbitrary_stack_traffic() {
    let source = "PUSH 2.5\nPOP DX\nPUSH 9\nSQRT\nPOP\nPUSH DX\nOUT\nHLT\n";
    let image = assemble_source(source).unwrap();
    let mut machine = machine_for(image, &[]);
    machine.run_to_halt().unwrap();
    assert_eq!(machine.register(Register::Dx), 2.5);
    assert_eq!(machine.console().outputs, vec![2.5]);
}

// --- Round-trip and closure properties ---

#[test]
fn disassembly_reassembles_byte_for_byte() {
    let sources = [
        "PUSH 2\nPUSH 3\nADD\nOUT\nHLT\n",
        "PUSH 0.1\nPUSH -3.5\nPUSH 1e-9\nADD\nADD\nOUT\nHLT\n",
        "PUSH 5\nPUSH 5\nJMPE eq\nPUSH 0\nJMP end\neq:\nPUSH 1\nend:\nOUT\nHLT\n",
        "CALL sub\nHLT\nsub:\nPUSH 42\nOUT\nRET\n",
        "loop:\nIN\nDUP\nPUSH 0\nJMPE done\nJMP loop\ndone:\nHLT\n",
        "POP AX\nPOP [10]\nPUSH [AX]\nPUSH [3]\nHLT\n",
    ];
    for source in sources {
        let image = assemble_source(source).unwrap();
        let text = disassemble_bytes(&image).unwrap();
        let reassembled = assemble_source(&text).unwrap();
        assert_eq!(reassembled, image, "round trip failed for:\n{source}");
    }
}

#[test]
fn disassembly_is_semantically_equivalent() {
    let source = "PUSH 5\nPUSH 5\nJMPE eq\nPUSH 0\nJMP end\neq:\nPUSH 1\nend:\nOUT\nHLT\n";
    let original = assemble_source(source).unwrap();
    let text = disassemble_bytes(&original).unwrap();
    let reassembled = assemble_source(&text).unwrap();

    let mut first = machine_for(original, &[]);
    first.run_to_halt().unwrap();
    let mut second = machine_for(reassembled, &[]);
    second.run_to_halt().unwrap();
    assert_eq!(
        first.into_console().outputs,
        second.into_console().outputs
    );
}

/// Walks an image and returns every instruction's opcode-byte offset.
fn instruction_starts(image: &[u8]) -> Vec<i32> {
    let mut starts = Vec::new();
    let mut offset = 0_usize;
    while offset < image.len() {
        starts.push(offset as i32);
        let split = OpByte::decode(image[offset]).unwrap();
        let size = 1 + split.operand_kind().unwrap().size() as usize;
        offset += size;
    }
    assert_eq!(offset, image.len());
    starts
}

#[test]
fn jump_offsets_land_on_instruction_starts() {
    let source = "start:\nPUSH 1\nPUSH 2\nJMPL less\nCALL sub\nJMP start\nless:\nHLT\nsub:\nRET\n";
    let image = assemble_source(source).unwrap();
    let starts = instruction_starts(&image);
    let mut checked = 0;
    for &start in &starts {
        let at = start as usize;
        let split = OpByte::decode(image[at]).unwrap();
        if split.operand_kind() == Some(OperandKind::Offset) {
            let raw = i32::from_le_bytes([
                image[at + 1],
                image[at + 2],
                image[at + 3],
                image[at + 4],
            ]);
            // The stored offset is relative to the byte after the opcode.
            let target = start + 1 + raw;
            assert!(
                starts.contains(&target),
                "jump at {start} targets {target}, not an instruction"
            );
            checked += 1;
        }
    }
    assert_eq!(checked, 3);
}

// --- File entry points ---

#[test]
fn assemble_and_disassemble_work_through_files() {
    let source_path = temp_path("src.txt");
    let binary_path = temp_path("prog.bin");
    let text_path = temp_path("prog.disasm.txt");
    let source = "PUSH 2\nPUSH 3\nADD\nOUT\nHLT\n";
    fs::write(&source_path, source).unwrap();

    assemble(&source_path, &binary_path).unwrap();
    let image = fs::read(&binary_path).unwrap();
    assert_eq!(image, assemble_source(source).unwrap());

    disassemble(&binary_path, &text_path).unwrap();
    let text = fs::read_to_string(&text_path).unwrap();
    assert_eq!(text, source);

    for path in [&source_path, &binary_path, &text_path] {
        let _ = fs::remove_file(path);
    }
}

#[test]
fn run_reports_sentinels_for_bad_programs() {
    let binary_path = temp_path("underflow.bin");
    fs::write(
        &binary_path,
        assemble_source("POP\nHLT\n").unwrap(),
    )
    .unwrap();
    assert_eq!(vm::run(&binary_path), Err(MachineError::StackUnderflow));
    let _ = fs::remove_file(&binary_path);
}

#[test]
fn run_succeeds_on_a_quiet_program() {
    let binary_path = temp_path("quiet.bin");
    fs::write(
        &binary_path,
        assemble_source("PUSH 1\nPOP AX\nHLT\n").unwrap(),
    )
    .unwrap();
    assert_eq!(vm::run(&binary_path), Ok(()));
    let _ = fs::remove_file(&binary_path);
}

#[test]
fn missing_and_empty_files_are_invalid() {
    let missing = temp_path("missing.bin");
    assert_eq!(vm::run(&missing), Err(MachineError::InvalidFile));
    assert_eq!(
        assemble(&missing, &temp_path("out.bin")),
        Err(MachineError::InvalidFile)
    );

    let empty = temp_path("empty.bin");
    fs::write(&empty, []).unwrap();
    assert_eq!(vm::run(&empty), Err(MachineError::InvalidFile));
    assert_eq!(
        disassemble(&empty, &temp_path("out.txt")),
        Err(MachineError::InvalidFile)
    );
    let _ = fs::remove_file(&empty);
}

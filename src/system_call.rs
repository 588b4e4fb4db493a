//! System call handler

use std::collections::VecDeque;
use std::io::{self, Write};

use text_io::try_read;

use crate::cpu::{CPUState, A0, A7};
use crate::error::{SimulatorError, SimulatorResult};
use crate::memory::hierarchy::MemorySystem;

/// Longest string the print-string call emits
pub const MAX_STRING_LEN: usize = 100;

/// Where a program's I/O goes
pub trait SyscallHost {
    fn write_output(&mut self, text: &str) -> SimulatorResult<()>;
    fn read_int(&mut self) -> SimulatorResult<i64>;
}

/// Standard output and standard input
#[derive(Debug, Default)]
pub struct ConsoleHost;

impl SyscallHost for ConsoleHost {
    fn write_output(&mut self, text: &str) -> SimulatorResult<()> {
        let mut stdout = io::stdout();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn read_int(&mut self) -> SimulatorResult<i64> {
        let value: Result<i64, _> = try_read!();
        value.map_err(|e| {
            SimulatorError::IoError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to read an integer: {:?}", e),
            ))
        })
    }
}

/// Captures output and replays queued input
#[derive(Debug, Default)]
pub struct BufferHost {
    pub output: String,
    pub input: VecDeque<i64>,
}

impl BufferHost {
    pub fn with_input(input: impl IntoIterator<Item = i64>) -> Self {
        Self { output: String::new(), input: input.into_iter().collect() }
    }
}

impl SyscallHost for BufferHost {
    fn write_output(&mut self, text: &str) -> SimulatorResult<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_int(&mut self) -> SimulatorResult<i64> {
        self.input.pop_front().ok_or_else(|| {
            SimulatorError::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no more input",
            ))
        })
    }
}

/// Handles the system call selected by a7 with argument a0.
/// Returns the memory cycles it spent.
pub fn syscall(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    host: &mut impl SyscallHost,
) -> SimulatorResult<u64> {
    let call_type = cpu.read_gpr(A7);
    let call_arg = cpu.read_gpr(A0);
    let mut cycles = 0;

    match call_type {
        88 => {
            log::info!("ECALL: sleep");
        }
        89 => {
            log::info!("ECALL: print integer");
            host.write_output(&format!("{}\n", call_arg as i64))?;
        }
        90 => {
            log::info!("ECALL: print character");
            host.write_output(&format!("{}\n", call_arg as u8 as char))?;
        }
        91 => {
            log::info!("ECALL: print string");
            let mut text = String::new();
            let mut address = call_arg;
            let mut truncated = true;
            for _ in 0..MAX_STRING_LEN {
                let (byte, spent) = mem.read(address, 1)?;
                cycles = cycles.max(spent);
                if byte == 0 {
                    truncated = false;
                    break;
                }
                text.push(byte as u8 as char);
                address += 1;
            }
            if truncated {
                // One more byte decides whether the cap was hit
                let (byte, spent) = mem.read(address, 1)?;
                cycles = cycles.max(spent);
                truncated = byte != 0;
            }
            if truncated {
                log::warn!("string at {:#x} truncated", call_arg);
                text.push_str("\nprintf str too long!");
            }
            text.push('\n');
            host.write_output(&text)?;
        }
        92 => {
            log::info!("ECALL: read integer");
            let value = host.read_int()?;
            cpu.write_gpr(A0, value as u64);
        }
        93 => {
            log::info!("ECALL: exit with {}", call_arg as i64);
            cpu.exit_code = Some(call_arg as i64);
        }
        _ => {
            log::warn!("unknown system call {}", call_type);
        }
    }

    Ok(cycles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn setup(a7: u64, a0: u64) -> (CPUState, MemorySystem, BufferHost) {
        let mut cpu = CPUState::make(0);
        cpu.write_gpr(A7, a7);
        cpu.write_gpr(A0, a0);
        let mem = MemorySystem::from_config(&SimConfig::default()).unwrap();
        (cpu, mem, BufferHost::default())
    }

    #[test]
    fn test_print_integer_and_char() {
        let (mut cpu, mut mem, mut host) = setup(89, (-12i64) as u64);
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        cpu.write_gpr(A7, 90);
        cpu.write_gpr(A0, b'x' as u64);
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        assert_eq!(host.output, "-12\nx\n");
    }

    #[test]
    fn test_print_string() {
        let (mut cpu, mut mem, mut host) = setup(91, 0x4000);
        mem.load_image(0x4000, b"hello\0", 6).unwrap();
        let cycles = syscall(&mut cpu, &mut mem, &mut host).unwrap();
        assert_eq!(host.output, "hello\n");
        assert!(cycles > 0);
    }

    #[test]
    fn test_print_string_truncates() {
        let (mut cpu, mut mem, mut host) = setup(91, 0x4000);
        mem.load_image(0x4000, &[b'a'; 150], 151).unwrap();
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        let expected = format!("{}\nprintf str too long!\n", "a".repeat(100));
        assert_eq!(host.output, expected);
    }

    #[test]
    fn test_print_string_at_cap() {
        let (mut cpu, mut mem, mut host) = setup(91, 0x4000);
        mem.load_image(0x4000, &[b'b'; 100], 101).unwrap();
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        assert_eq!(host.output, format!("{}\n", "b".repeat(100)));
    }

    #[test]
    fn test_read_integer() {
        let (mut cpu, mut mem, _) = setup(92, 0);
        let mut host = BufferHost::with_input([-7]);
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        assert_eq!(cpu.read_gpr(A0) as i64, -7);
        assert!(syscall(&mut cpu, &mut mem, &mut host).is_err());
    }

    #[test]
    fn test_exit_and_unknown() {
        let (mut cpu, mut mem, mut host) = setup(1234, 5);
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        assert!(!cpu.has_exited());

        cpu.write_gpr(A7, 93);
        syscall(&mut cpu, &mut mem, &mut host).unwrap();
        assert_eq!(cpu.exit_code, Some(5));
        assert!(host.output.is_empty());
    }
}

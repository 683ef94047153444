use g10_vm::{Bus, BusFault, Cpu, RESET_PC};

pub const RAM_BASE: u32 = 0x8000_0000;
pub const STACK_TOP: u32 = RAM_BASE + 0x1_0000;

/// Flat test memory: ROM at the bottom of the address space, RAM at
/// `0x8000_0000`. ROM rejects writes; everything unmapped rejects both.
pub struct FlatBus {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub ticked_m_cycles: u64,
}

impl FlatBus {
    pub fn new(rom_size: usize, ram_size: usize) -> Self {
        Self {
            rom: vec![0; rom_size],
            ram: vec![0; ram_size],
            ticked_m_cycles: 0,
        }
    }
}

impl Bus for FlatBus {
    fn read(&mut self, addr: u32) -> Result<u8, BusFault> {
        if addr < RAM_BASE {
            self.rom
                .get(addr as usize)
                .copied()
                .ok_or(BusFault::Read(addr))
        } else {
            self.ram
                .get((addr - RAM_BASE) as usize)
                .copied()
                .ok_or(BusFault::Read(addr))
        }
    }

    fn write(&mut self, addr: u32, value: u8) -> Result<(), BusFault> {
        if addr < RAM_BASE {
            return Err(BusFault::Write(addr));
        }
        let slot = self
            .ram
            .get_mut((addr - RAM_BASE) as usize)
            .ok_or(BusFault::Write(addr))?;
        *slot = value;
        Ok(())
    }

    fn on_machine_cycles(&mut self, m_cycles: u32) -> Result<(), BusFault> {
        self.ticked_m_cycles += u64::from(m_cycles);
        Ok(())
    }
}

/// A CPU with `code` placed at the reset vector and a stack in RAM.
pub fn cpu_with_program(code: &[u8]) -> Cpu<FlatBus> {
    let mut bus = FlatBus::new(0x8000, 0x1_0000);
    bus.rom[RESET_PC as usize..RESET_PC as usize + code.len()]
        .copy_from_slice(code);
    let mut cpu = Cpu::new(bus);
    cpu.registers_mut().sp = STACK_TOP;
    cpu
}

/// Read the dword at the top of the stack.
pub fn stack_top(cpu: &mut Cpu<FlatBus>) -> u32 {
    let sp = cpu.registers().sp;
    let bytes: Vec<u8> = (0..4)
        .map(|i| cpu.bus_mut().read(sp + i).unwrap())
        .collect();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

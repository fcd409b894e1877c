//! # The Complete Machine
//!
//! [`System`] ties a [`CPU`] to an instrumented [`AddressBus`] populated with
//! the standard VCS memory map:
//!
//! | Range           | Device                                    |
//! |-----------------|-------------------------------------------|
//! | `$0000-$007F`   | TIA registers                             |
//! | `$0080-$00FF`   | RIOT RAM (128 bytes)                      |
//! | `$0180-$01FF`   | mirror of RIOT RAM, so the stack works    |
//! | `$0280-$029F`   | RIOT I/O ports (SWCHA, SWCHB, timers)     |
//! | `$02A0`         | I2C EEPROM bus register, when attached    |
//! | `$F000-$FFFF`   | cartridge                                 |
//!
//! ```
//! use vcs_debug::{Cartridge, System};
//!
//! let mut rom = vec![0xEA; 4096]; // NOPs
//! rom[0xFFC] = 0x00;
//! rom[0xFFD] = 0xF0;
//!
//! let mut system = System::new(Cartridge::new(rom, false).unwrap()).unwrap();
//! assert_eq!(system.cpu().pc(), 0xF000);
//!
//! let cycles = system.step().unwrap();
//! assert_eq!(cycles, 2);
//! assert_eq!(system.cpu().pc(), 0xF001);
//! ```

use crate::devices::{AddressBus, Cartridge, DeviceError, I2cEeprom, RamDevice, Tia};
use crate::expression::Inspect;
use crate::serializer::StateError;
use crate::{state, ExecutionError, CPU};

pub const TIA_BASE: u16 = 0x0000;
pub const RAM_BASE: u16 = 0x0080;
pub const RIOT_IO_BASE: u16 = 0x0280;
/// Default location of the EEPROM bus register.
pub const EEPROM_PORT: u16 = 0x02A0;
pub const CARTRIDGE_BASE: u16 = 0xF000;

const RAM_SIZE: u16 = 0x80;
const RIOT_IO_SIZE: u16 = 0x20;
const STACK_MIRROR_BASE: u16 = 0x0180;

/// CPU plus bus.
pub struct System {
    cpu: CPU,
    bus: AddressBus,
}

impl System {
    /// Build the standard VCS memory map around `cartridge` and reset the CPU.
    pub fn new(cartridge: Cartridge) -> Result<Self, DeviceError> {
        let mut bus = AddressBus::new();
        bus.add_device(TIA_BASE, Box::new(Tia::new()))?;
        bus.add_device(RAM_BASE, Box::new(RamDevice::new(RAM_SIZE)))?;
        bus.add_mirror(STACK_MIRROR_BASE, RAM_SIZE, RAM_BASE);
        // Ports read as released / not pressed until something drives them
        bus.add_device(
            RIOT_IO_BASE,
            Box::new(RamDevice::named("RIOT", RIOT_IO_SIZE, 0xFF)),
        )?;
        bus.add_device(CARTRIDGE_BASE, Box::new(cartridge))?;
        Ok(Self::with_bus(bus))
    }

    /// Wrap an already populated bus, loading PC from its reset vector.
    pub fn with_bus(mut bus: AddressBus) -> Self {
        let cpu = CPU::new(&mut bus);
        bus.take_trap_hit();
        Self { cpu, bus }
    }

    /// Map an EEPROM bus register at `base`.
    pub fn attach_eeprom(&mut self, base: u16, eeprom: I2cEeprom) -> Result<(), DeviceError> {
        self.bus.add_device(base, Box::new(eeprom))
    }

    pub fn cpu(&self) -> &CPU {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CPU {
        &mut self.cpu
    }

    pub fn bus(&self) -> &AddressBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut AddressBus {
        &mut self.bus
    }

    /// Borrow CPU and bus independently.
    pub fn parts_mut(&mut self) -> (&mut CPU, &mut AddressBus) {
        (&mut self.cpu, &mut self.bus)
    }

    pub fn tia(&self) -> Option<&Tia> {
        self.bus.device::<Tia>()
    }

    pub fn tia_mut(&mut self) -> Option<&mut Tia> {
        self.bus.device_mut::<Tia>()
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.bus.device::<Cartridge>()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.bus.device_mut::<Cartridge>()
    }

    pub fn eeprom(&self) -> Option<&I2cEeprom> {
        self.bus.device::<I2cEeprom>()
    }

    pub fn eeprom_mut(&mut self) -> Option<&mut I2cEeprom> {
        self.bus.device_mut::<I2cEeprom>()
    }

    /// Reset the CPU. Device state is left alone, as on the real console.
    ///
    /// Fetching the reset vector never counts as a trap hit.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.bus.take_trap_hit();
    }

    /// Execute one instruction and advance every device by the cycles it took,
    /// including any WSYNC stall. Returns the total cycles.
    pub fn step(&mut self) -> Result<u32, ExecutionError> {
        if let Some(cart) = self.cartridge_mut() {
            cart.clear_write_port_read();
        }

        let mut cycles = self.cpu.step(&mut self.bus)?;
        self.bus.tick(cycles);

        let stall = match self.bus.device_mut::<Tia>() {
            Some(tia) => {
                if tia.take_wsync() {
                    tia.cycles_to_line_end()
                } else {
                    0
                }
            }
            None => 0,
        };
        if stall > 0 {
            self.cpu.add_cycles(stall);
            self.bus.tick(stall);
            cycles += stall;
        }
        Ok(cycles)
    }

    /// Serialize the whole machine.
    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        state::capture(self)
    }

    /// Restore a blob produced by [`System::save_state`]. On error nothing
    /// changes.
    pub fn load_state(&mut self, blob: &[u8]) -> Result<(), StateError> {
        state::restore(self, blob)
    }
}

impl Inspect for System {
    fn cpu(&self) -> &CPU {
        &self.cpu
    }

    fn tia(&self) -> Option<&Tia> {
        self.bus.device::<Tia>()
    }

    fn cartridge(&self) -> Option<&Cartridge> {
        self.bus.device::<Cartridge>()
    }

    fn peek(&mut self, addr: u16) -> u8 {
        self.bus.lock_guard().peek(addr)
    }
}

//! Shared register store backing the request processor
//!
//! A [`DataArea`] owns four address-sorted sequences, one per register
//! kind, guarded by a single mutex. All sessions of a server share one
//! instance; every read and write goes through the lock, so no register is
//! ever observed half-updated.
//!
//! Range reads copy the matching entries out under the lock and return the
//! snapshot by value, releasing the lock before the caller encodes a
//! response. Write operations hold the lock only for a single-address
//! update; a multi-register request re-acquires it per element, which is
//! fine because Modbus gives no transactional guarantee across one request.
//!
//! # Example
//!
//! ```rust
//! use station_modbus::{Coil, DataArea, Register, ValuePattern};
//!
//! let area = DataArea::new();
//! area.insert_coil(Coil::new(1, true))?;
//! area.generate_holding_registers(0, 10, ValuePattern::Incremental)?;
//!
//! let coils = area.get_coils(1, 1)?;
//! assert!(coils[0].value());
//! # Ok::<(), station_modbus::ModbusError>(())
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::ThreadRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    MAX_READ_COILS, MAX_READ_REGISTERS, MAX_REGISTERS_PER_KIND,
};
use crate::error::{ModbusError, ModbusResult};
use crate::register::{Coil, DiscreteInput, HoldingRegister, InputRegister, Register};

/// Fill pattern for bulk register generation
///
/// `Incremental`, `Decremental` and `Max` only make sense for word kinds;
/// requesting them for coils or discrete inputs fails with an
/// invalid-data error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuePattern {
    /// All zeros / all off
    Zeros,
    /// All ones / all on
    Ones,
    /// Value `i` at offset `i`
    Incremental,
    /// Value `count - i` at offset `i`
    Decremental,
    /// Uniformly random values
    Random,
    /// `u16::MAX` in every register
    Max,
}

#[derive(Debug, Default)]
struct Stores {
    coils: Vec<Coil>,
    discrete_inputs: Vec<DiscreteInput>,
    holding_registers: Vec<HoldingRegister>,
    input_registers: Vec<InputRegister>,
}

/// Thread-safe register store shared by all server sessions
#[derive(Debug, Default)]
pub struct DataArea {
    stores: Mutex<Stores>,
}

impl DataArea {
    /// Create an empty data area
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Stores> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Insertion =====

    /// Insert a coil, keeping the store sorted by address
    ///
    /// Fails with [`ModbusError::DuplicateAddress`] if the address is
    /// already present, or [`ModbusError::CapacityExceeded`] once the
    /// store holds the full 16-bit address space.
    pub fn insert_coil(&self, coil: Coil) -> ModbusResult<()> {
        insert_sorted(&mut self.lock().coils, coil, "coil")
    }

    /// Insert a discrete input, keeping the store sorted by address
    pub fn insert_discrete_input(&self, input: DiscreteInput) -> ModbusResult<()> {
        insert_sorted(&mut self.lock().discrete_inputs, input, "discrete input")
    }

    /// Insert a holding register, keeping the store sorted by address
    pub fn insert_holding_register(&self, register: HoldingRegister) -> ModbusResult<()> {
        insert_sorted(
            &mut self.lock().holding_registers,
            register,
            "holding register",
        )
    }

    /// Insert an input register, keeping the store sorted by address
    pub fn insert_input_register(&self, register: InputRegister) -> ModbusResult<()> {
        insert_sorted(&mut self.lock().input_registers, register, "input register")
    }

    // ===== Whole-area snapshots =====

    /// Snapshot of all coils in ascending address order
    pub fn coils(&self) -> Vec<Coil> {
        self.lock().coils.clone()
    }

    /// Snapshot of all discrete inputs in ascending address order
    pub fn discrete_inputs(&self) -> Vec<DiscreteInput> {
        self.lock().discrete_inputs.clone()
    }

    /// Snapshot of all holding registers in ascending address order
    pub fn holding_registers(&self) -> Vec<HoldingRegister> {
        self.lock().holding_registers.clone()
    }

    /// Snapshot of all input registers in ascending address order
    pub fn input_registers(&self) -> Vec<InputRegister> {
        self.lock().input_registers.clone()
    }

    // ===== Range reads =====

    /// Snapshot the coils in `[start, start + length - 1]`
    ///
    /// Fails with an out-of-range error if `length` is zero, if the range
    /// end would overflow the 16-bit address space, if `length` exceeds
    /// the 2000-coil per-request limit, or if any address in the range is
    /// absent. The limit check runs before any lookup so an oversized
    /// request is reported as oversized even against an empty store.
    pub fn get_coils(&self, start: u16, length: u16) -> ModbusResult<Vec<Coil>> {
        range_snapshot(&self.lock().coils, start, length, MAX_READ_COILS)
    }

    /// Snapshot the discrete inputs in `[start, start + length - 1]`
    ///
    /// Same contract as [`DataArea::get_coils`] (2000-entry limit).
    pub fn get_discrete_inputs(&self, start: u16, length: u16) -> ModbusResult<Vec<DiscreteInput>> {
        range_snapshot(&self.lock().discrete_inputs, start, length, MAX_READ_COILS)
    }

    /// Snapshot the holding registers in `[start, start + length - 1]`
    ///
    /// Same contract as [`DataArea::get_coils`] with the 125-register
    /// per-request limit.
    pub fn get_holding_registers(
        &self,
        start: u16,
        length: u16,
    ) -> ModbusResult<Vec<HoldingRegister>> {
        range_snapshot(
            &self.lock().holding_registers,
            start,
            length,
            MAX_READ_REGISTERS,
        )
    }

    /// Snapshot the input registers in `[start, start + length - 1]`
    ///
    /// Same contract as [`DataArea::get_holding_registers`].
    pub fn get_input_registers(
        &self,
        start: u16,
        length: u16,
    ) -> ModbusResult<Vec<InputRegister>> {
        range_snapshot(
            &self.lock().input_registers,
            start,
            length,
            MAX_READ_REGISTERS,
        )
    }

    // ===== Client write paths (used by the request processor) =====

    /// Update the coil at `address` in place
    ///
    /// Fails with an out-of-range error if the address is not present.
    pub fn write_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        write_in_place(&mut self.lock().coils, address, value)
    }

    /// Update the holding register at `address` in place
    ///
    /// Fails with an out-of-range error if the address is not present.
    pub fn write_holding_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        write_in_place(&mut self.lock().holding_registers, address, value)
    }

    // ===== Application write paths =====
    //
    // Discrete inputs and input registers are read-only on the wire; the
    // owning application refreshes them through these two methods.

    /// Update the discrete input at `address` in place
    pub fn set_discrete_input(&self, address: u16, value: bool) -> ModbusResult<()> {
        write_in_place(&mut self.lock().discrete_inputs, address, value)
    }

    /// Update the input register at `address` in place
    pub fn set_input_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        write_in_place(&mut self.lock().input_registers, address, value)
    }

    // ===== Bulk generation =====

    /// Insert `count` coils starting at `start`, filled per `pattern`
    ///
    /// Only [`ValuePattern::Zeros`], [`ValuePattern::Ones`] and
    /// [`ValuePattern::Random`] are valid for bit kinds.
    pub fn generate_coils(&self, start: u16, count: u16, pattern: ValuePattern) -> ModbusResult<()> {
        generate_sorted(&mut self.lock().coils, start, count, pattern, "coil")
    }

    /// Insert `count` discrete inputs starting at `start`, filled per `pattern`
    ///
    /// Only [`ValuePattern::Zeros`], [`ValuePattern::Ones`] and
    /// [`ValuePattern::Random`] are valid for bit kinds.
    pub fn generate_discrete_inputs(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> ModbusResult<()> {
        generate_sorted(
            &mut self.lock().discrete_inputs,
            start,
            count,
            pattern,
            "discrete input",
        )
    }

    /// Insert `count` holding registers starting at `start`, filled per `pattern`
    pub fn generate_holding_registers(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> ModbusResult<()> {
        generate_sorted(
            &mut self.lock().holding_registers,
            start,
            count,
            pattern,
            "holding register",
        )
    }

    /// Insert `count` input registers starting at `start`, filled per `pattern`
    pub fn generate_input_registers(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> ModbusResult<()> {
        generate_sorted(
            &mut self.lock().input_registers,
            start,
            count,
            pattern,
            "input register",
        )
    }
}

fn insert_sorted<R: Register>(store: &mut Vec<R>, register: R, kind: &'static str) -> ModbusResult<()> {
    match store.binary_search_by_key(&register.address(), |r| r.address()) {
        Ok(_) => Err(ModbusError::DuplicateAddress {
            address: register.address(),
        }),
        Err(position) => {
            if store.len() >= MAX_REGISTERS_PER_KIND {
                return Err(ModbusError::CapacityExceeded { kind });
            }
            store.insert(position, register);
            Ok(())
        }
    }
}

fn range_snapshot<R: Register + Copy>(
    store: &[R],
    start: u16,
    length: u16,
    max_per_request: u16,
) -> ModbusResult<Vec<R>> {
    if length == 0 {
        return Err(ModbusError::out_of_range("range length must be nonzero"));
    }
    // Limit check precedes any lookup: oversized requests report as
    // oversized, not as missing addresses.
    if length > max_per_request {
        return Err(ModbusError::out_of_range(format!(
            "range length {} exceeds the per-request limit of {}",
            length, max_per_request
        )));
    }
    let end = start.checked_add(length - 1).ok_or_else(|| {
        ModbusError::out_of_range(format!(
            "range {}+{} overflows the 16-bit address space",
            start, length
        ))
    })?;

    let first = store
        .binary_search_by_key(&start, |r| r.address())
        .map_err(|_| ModbusError::out_of_range(format!("address {} is not present", start)))?;
    let last = first + (length as usize) - 1;

    // Addresses are sorted and unique, so finding `end` exactly
    // `length - 1` entries after `start` proves the whole range is there.
    match store.get(last) {
        Some(register) if register.address() == end => Ok(store[first..=last].to_vec()),
        _ => Err(ModbusError::out_of_range(format!(
            "address range {}..={} is not fully populated",
            start, end
        ))),
    }
}

fn write_in_place<R: Register>(store: &mut [R], address: u16, value: R::Value) -> ModbusResult<()> {
    match store.binary_search_by_key(&address, |r| r.address()) {
        Ok(index) => {
            store[index].set(value);
            Ok(())
        }
        Err(_) => Err(ModbusError::out_of_range(format!(
            "address {} is not present",
            address
        ))),
    }
}

/// Pattern expansion for a register value type
///
/// Implemented for the two value types the four kinds store; the bit impl
/// is where word-only patterns are rejected, so the rule holds for every
/// bit kind at once.
trait PatternValue: Sized {
    fn from_pattern(
        pattern: ValuePattern,
        offset: u16,
        count: u16,
        rng: &mut ThreadRng,
    ) -> ModbusResult<Self>;
}

impl PatternValue for bool {
    fn from_pattern(
        pattern: ValuePattern,
        _offset: u16,
        _count: u16,
        rng: &mut ThreadRng,
    ) -> ModbusResult<Self> {
        match pattern {
            ValuePattern::Zeros => Ok(false),
            ValuePattern::Ones => Ok(true),
            ValuePattern::Random => Ok(rng.random()),
            ValuePattern::Incremental | ValuePattern::Decremental | ValuePattern::Max => {
                Err(ModbusError::invalid_data(format!(
                    "pattern {:?} is not valid for bit registers",
                    pattern
                )))
            }
        }
    }
}

impl PatternValue for u16 {
    fn from_pattern(
        pattern: ValuePattern,
        offset: u16,
        count: u16,
        rng: &mut ThreadRng,
    ) -> ModbusResult<Self> {
        Ok(match pattern {
            ValuePattern::Zeros => 0,
            ValuePattern::Ones => 1,
            ValuePattern::Incremental => offset,
            ValuePattern::Decremental => count - offset,
            ValuePattern::Random => rng.random(),
            ValuePattern::Max => u16::MAX,
        })
    }
}

fn generate_sorted<R>(
    store: &mut Vec<R>,
    start: u16,
    count: u16,
    pattern: ValuePattern,
    kind: &'static str,
) -> ModbusResult<()>
where
    R: Register,
    R::Value: PatternValue,
{
    if count == 0 {
        return Err(ModbusError::invalid_data("generation count must be nonzero"));
    }
    start.checked_add(count - 1).ok_or_else(|| {
        ModbusError::out_of_range(format!(
            "generation range {}+{} overflows the 16-bit address space",
            start, count
        ))
    })?;

    let mut rng = rand::rng();
    for offset in 0..count {
        let value = R::Value::from_pattern(pattern, offset, count, &mut rng)?;
        insert_sorted(store, R::new(start + offset, value), kind)?;
    }

    debug!("Generated {} {}s starting at address {}", count, kind, start);
    Ok(())
}

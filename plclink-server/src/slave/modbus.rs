//! Modbus slave for RTU, ASCII and TCP framing

use super::{FrameOutcome, SlaveProtocol};
use crate::handler::{ModbusReadContext, ModbusRequestHandler, ModbusTable, ModbusWriteContext};
use plclink_codec::framing::FrameCheck;
use plclink_codec::hex::hex_u8;
use plclink_codec::modbus::{FunctionCode, ModbusAdu, ModbusFraming, ModbusRequest, ModbusResponse};
use plclink_core::nak::{ModbusException, NakCode};
use std::sync::Arc;

/// Unit id every serial station accepts and never answers
pub const BROADCAST_UNIT: u8 = 0;

pub struct ModbusSlave {
    framing: ModbusFraming,
    /// Answer only this unit id; `None` answers every unit
    unit_id: Option<u8>,
    handler: Arc<dyn ModbusRequestHandler>,
}

impl ModbusSlave {
    pub fn new(framing: ModbusFraming, handler: Arc<dyn ModbusRequestHandler>) -> Self {
        Self {
            framing,
            unit_id: None,
            handler,
        }
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    pub fn framing(&self) -> ModbusFraming {
        self.framing
    }

    fn accepts(&self, unit_id: u8) -> bool {
        match self.unit_id {
            Some(own) => unit_id == own || (unit_id == BROADCAST_UNIT && self.is_serial()),
            None => true,
        }
    }

    fn is_serial(&self) -> bool {
        self.framing != ModbusFraming::Tcp
    }

    fn frame(&self, request: &ModbusAdu, response: &ModbusResponse) -> Vec<u8> {
        self.framing.encode(&ModbusAdu {
            transaction_id: request.transaction_id,
            unit_id: request.unit_id,
            pdu: response.encode(),
        })
    }

    fn dispatch(&self, unit_id: u8, request: ModbusRequest) -> ModbusResponse {
        let function = request.function();
        let code = function.code();
        match request {
            ModbusRequest::ReadCoils { address, quantity } => {
                self.read(unit_id, ModbusTable::Coils, address, quantity, function)
            }
            ModbusRequest::ReadDiscreteInputs { address, quantity } => {
                self.read(unit_id, ModbusTable::DiscreteInputs, address, quantity, function)
            }
            ModbusRequest::ReadHoldingRegisters { address, quantity } => {
                self.read(unit_id, ModbusTable::HoldingRegisters, address, quantity, function)
            }
            ModbusRequest::ReadInputRegisters { address, quantity } => {
                self.read(unit_id, ModbusTable::InputRegisters, address, quantity, function)
            }
            ModbusRequest::WriteSingleCoil { address, value } => {
                let mut context = ModbusWriteContext::coils(unit_id, address, vec![value]);
                self.write(&mut context, code, ModbusResponse::WriteSingleCoil { address, value })
            }
            ModbusRequest::WriteSingleRegister { address, value } => {
                let mut context = ModbusWriteContext::registers(unit_id, address, vec![value]);
                self.write(&mut context, code, ModbusResponse::WriteSingleRegister { address, value })
            }
            ModbusRequest::WriteMultipleCoils { address, values } => {
                let quantity = values.len() as u16;
                let mut context = ModbusWriteContext::coils(unit_id, address, values);
                let echo = ModbusResponse::WriteMultiple { function, address, quantity };
                self.write(&mut context, code, echo)
            }
            ModbusRequest::WriteMultipleRegisters { address, values } => {
                let quantity = values.len() as u16;
                let mut context = ModbusWriteContext::registers(unit_id, address, values);
                let echo = ModbusResponse::WriteMultiple { function, address, quantity };
                self.write(&mut context, code, echo)
            }
        }
    }

    fn read(
        &self,
        unit_id: u8,
        table: ModbusTable,
        address: u16,
        quantity: u16,
        function: FunctionCode,
    ) -> ModbusResponse {
        let code = function.code();
        let mut context = ModbusReadContext::new(unit_id, table, address, quantity);
        self.handler.on_read(&mut context);
        if let Some(exception) = context.nak() {
            return ModbusResponse::exception(code, exception);
        }

        let filled = if table.is_bits() {
            context.bits.len()
        } else {
            context.registers.len()
        };
        if filled != quantity as usize {
            log::warn!(
                "Modbus handler filled {} of {} {:?} at {}",
                filled,
                quantity,
                table,
                address
            );
            return ModbusResponse::exception(code, ModbusException::ServerDeviceFailure);
        }

        if table.is_bits() {
            ModbusResponse::ReadBits {
                function,
                values: context.bits,
            }
        } else {
            ModbusResponse::ReadRegisters {
                function,
                values: context.registers,
            }
        }
    }

    fn write(&self, context: &mut ModbusWriteContext, code: u8, echo: ModbusResponse) -> ModbusResponse {
        self.handler.on_write(context);
        match context.nak() {
            Some(exception) => ModbusResponse::exception(code, exception),
            None => echo,
        }
    }
}

impl SlaveProtocol for ModbusSlave {
    fn name(&self) -> &'static str {
        match self.framing {
            ModbusFraming::Rtu => "Modbus RTU",
            ModbusFraming::Ascii => "Modbus ASCII",
            ModbusFraming::Tcp => "Modbus TCP",
        }
    }

    fn header_len(&self) -> usize {
        self.framing.header_len()
    }

    fn check_request(&self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        self.framing.check_request(buf)
    }

    fn handle_frame(&self, frame: &[u8]) -> FrameOutcome {
        // A corrupted frame gets no reply: the master times out and retries.
        let adu = match self.framing.decode(frame) {
            Ok(adu) => adu,
            Err(code) => return FrameOutcome::Rejected { code, response: None },
        };
        if !self.accepts(adu.unit_id) {
            return FrameOutcome::Ignored;
        }
        let silent = adu.unit_id == BROADCAST_UNIT && self.is_serial();

        match ModbusRequest::decode(&adu.pdu) {
            Ok(request) => {
                let response = self.dispatch(adu.unit_id, request);
                FrameOutcome::Handled((!silent).then(|| self.frame(&adu, &response)))
            }
            Err(exception) => {
                let function = adu.pdu.first().copied().unwrap_or_default();
                let response = ModbusResponse::exception(function, exception);
                FrameOutcome::Rejected {
                    code: exception.into(),
                    response: (!silent).then(|| self.frame(&adu, &response)),
                }
            }
        }
    }

    fn reject(&self, partial: &[u8], code: NakCode) -> Option<Vec<u8>> {
        let NakCode::Modbus(exception) = code else {
            return None;
        };
        let (transaction_id, unit_id, function) = match self.framing {
            ModbusFraming::Rtu => (0, *partial.first()?, *partial.get(1)?),
            ModbusFraming::Ascii => (0, hex_u8(partial.get(1..3)?)?, hex_u8(partial.get(3..5)?)?),
            ModbusFraming::Tcp => (
                u16::from_be_bytes([*partial.first()?, *partial.get(1)?]),
                *partial.get(6)?,
                *partial.get(7)?,
            ),
        };
        if !self.accepts(unit_id) || (unit_id == BROADCAST_UNIT && self.is_serial()) {
            return None;
        }
        let adu = ModbusAdu {
            transaction_id,
            unit_id,
            pdu: Vec::new(),
        };
        Some(self.frame(&adu, &ModbusResponse::exception(function, exception)))
    }
}

//! Modbus master over RTU, ASCII or TCP framing

use crate::engine::{EngineConfig, MasterProtocol, RequestEngine};
use plclink_codec::framing::FrameCheck;
use plclink_codec::modbus::{ModbusAdu, ModbusFraming, ModbusRequest, ModbusResponse};
use plclink_core::error::{PlcError, PlcResult};
use plclink_core::nak::NakCode;
use plclink_transport::ByteChannel;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

/// One addressed Modbus request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusCall {
    /// Only carried by TCP framing
    pub transaction_id: u16,
    pub unit_id: u8,
    pub request: ModbusRequest,
}

/// A decoded response with its addressing fields
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusReply {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub response: ModbusResponse,
}

/// [`MasterProtocol`] for one Modbus framing
#[derive(Debug, Clone, Copy)]
pub struct ModbusProtocol {
    pub framing: ModbusFraming,
}

impl MasterProtocol for ModbusProtocol {
    type Request = ModbusCall;
    type Response = ModbusReply;

    fn encode(&self, call: &ModbusCall) -> PlcResult<Vec<u8>> {
        call.request.validate().map_err(|exception| {
            PlcError::InvalidData(format!(
                "{:?} not sendable: {}",
                call.request.function(),
                exception.description()
            ))
        })?;
        Ok(self.framing.encode(&ModbusAdu {
            transaction_id: call.transaction_id,
            unit_id: call.unit_id,
            pdu: call.request.encode(),
        }))
    }

    fn header_len(&self) -> usize {
        self.framing.header_len()
    }

    fn check_response(&self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        self.framing.check_response(buf)
    }

    fn decode(&self, frame: &[u8]) -> Result<ModbusReply, NakCode> {
        let adu = self.framing.decode(frame)?;
        Ok(ModbusReply {
            transaction_id: adu.transaction_id,
            unit_id: adu.unit_id,
            response: ModbusResponse::decode(&adu.pdu)?,
        })
    }

    fn nak_code(&self, reply: &ModbusReply) -> Option<NakCode> {
        match reply.response {
            ModbusResponse::Exception { exception, .. } => Some(exception.into()),
            _ => None,
        }
    }

    fn correlate(&self, call: &ModbusCall, reply: &ModbusReply) -> PlcResult<()> {
        if self.framing == ModbusFraming::Tcp && reply.transaction_id != call.transaction_id {
            return Err(PlcError::Correlation(format!(
                "transaction id {} answered with {}",
                call.transaction_id, reply.transaction_id
            )));
        }
        if reply.unit_id != call.unit_id {
            return Err(PlcError::Correlation(format!(
                "unit {} answered by unit {}",
                call.unit_id, reply.unit_id
            )));
        }
        let expected = call.request.function().code();
        if reply.response.function_code() & 0x7F != expected {
            return Err(PlcError::Correlation(format!(
                "function 0x{:02X} answered with 0x{:02X}",
                expected,
                reply.response.function_code()
            )));
        }
        Ok(())
    }
}

/// Typed Modbus master for one unit on one channel
pub struct ModbusMaster {
    engine: RequestEngine<ModbusProtocol>,
    unit_id: u8,
    next_transaction: AtomicU16,
}

impl ModbusMaster {
    pub fn new(channel: Arc<ByteChannel>, framing: ModbusFraming, unit_id: u8) -> Self {
        Self::with_config(channel, framing, unit_id, EngineConfig::default())
    }

    pub fn with_config(
        channel: Arc<ByteChannel>,
        framing: ModbusFraming,
        unit_id: u8,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine: RequestEngine::with_config(channel, ModbusProtocol { framing }, config),
            unit_id,
            next_transaction: AtomicU16::new(1),
        }
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn engine(&self) -> &RequestEngine<ModbusProtocol> {
        &self.engine
    }

    /// Send any request and return the decoded response
    pub async fn request(&self, request: ModbusRequest) -> PlcResult<ModbusResponse> {
        let call = ModbusCall {
            transaction_id: self.next_transaction.fetch_add(1, Ordering::Relaxed),
            unit_id: self.unit_id,
            request,
        };
        Ok(self.engine.request(&call).await?.response)
    }

    pub async fn read_coils(&self, address: u16, quantity: u16) -> PlcResult<Vec<bool>> {
        let response = self
            .request(ModbusRequest::ReadCoils { address, quantity })
            .await?;
        bits(&response, quantity)
    }

    pub async fn read_discrete_inputs(&self, address: u16, quantity: u16) -> PlcResult<Vec<bool>> {
        let response = self
            .request(ModbusRequest::ReadDiscreteInputs { address, quantity })
            .await?;
        bits(&response, quantity)
    }

    pub async fn read_holding_registers(&self, address: u16, quantity: u16) -> PlcResult<Vec<u16>> {
        let response = self
            .request(ModbusRequest::ReadHoldingRegisters { address, quantity })
            .await?;
        registers(&response, quantity)
    }

    pub async fn read_input_registers(&self, address: u16, quantity: u16) -> PlcResult<Vec<u16>> {
        let response = self
            .request(ModbusRequest::ReadInputRegisters { address, quantity })
            .await?;
        registers(&response, quantity)
    }

    pub async fn write_single_coil(&self, address: u16, value: bool) -> PlcResult<()> {
        self.request(ModbusRequest::WriteSingleCoil { address, value })
            .await
            .map(|_| ())
    }

    pub async fn write_single_register(&self, address: u16, value: u16) -> PlcResult<()> {
        self.request(ModbusRequest::WriteSingleRegister { address, value })
            .await
            .map(|_| ())
    }

    pub async fn write_multiple_coils(&self, address: u16, values: &[bool]) -> PlcResult<()> {
        self.request(ModbusRequest::WriteMultipleCoils {
            address,
            values: values.to_vec(),
        })
        .await
        .map(|_| ())
    }

    pub async fn write_multiple_registers(&self, address: u16, values: &[u16]) -> PlcResult<()> {
        self.request(ModbusRequest::WriteMultipleRegisters {
            address,
            values: values.to_vec(),
        })
        .await
        .map(|_| ())
    }
}

fn bits(response: &ModbusResponse, quantity: u16) -> PlcResult<Vec<bool>> {
    let values = response
        .bits()
        .ok_or_else(|| PlcError::InvalidData("response carries no bits".to_string()))?;
    if values.len() < quantity as usize {
        return Err(PlcError::InvalidData(format!(
            "expected {} bits, got {}",
            quantity,
            values.len()
        )));
    }
    Ok(values[..quantity as usize].to_vec())
}

fn registers(response: &ModbusResponse, quantity: u16) -> PlcResult<Vec<u16>> {
    let values = response
        .registers()
        .ok_or_else(|| PlcError::InvalidData("response carries no registers".to_string()))?;
    if values.len() != quantity as usize {
        return Err(PlcError::InvalidData(format!(
            "expected {} registers, got {}",
            quantity,
            values.len()
        )));
    }
    Ok(values.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plclink_codec::modbus::{rtu, tcp};
    use plclink_core::logging::NullCommLogger;
    use plclink_core::nak::ModbusException;
    use plclink_transport::ChannelKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio_test::assert_err;

    fn master(framing: ModbusFraming) -> (ModbusMaster, DuplexStream) {
        master_with_timeout(framing, 500)
    }

    fn master_with_timeout(framing: ModbusFraming, timeout_ms: u64) -> (ModbusMaster, DuplexStream) {
        let (local, remote) = tokio::io::duplex(512);
        let channel =
            ByteChannel::from_stream(local, ChannelKind::Stream, "modbus", Arc::new(NullCommLogger));
        let master = ModbusMaster::with_config(
            Arc::new(channel),
            framing,
            0x11,
            EngineConfig::new(timeout_ms),
        );
        (master, remote)
    }

    #[tokio::test]
    async fn test_rtu_read_holding_registers() {
        let (master, mut remote) = master(ModbusFraming::Rtu);
        tokio::spawn(async move {
            let mut request = [0u8; 8];
            remote.read_exact(&mut request).await.unwrap();
            assert_eq!(&request[..6], &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x02]);
            let reply = rtu::encode(0x11, &[0x03, 0x04, 0x02, 0x2B, 0x00, 0x64]);
            remote.write_all(&reply).await.unwrap();
            remote
        });

        let values = master.read_holding_registers(0x006B, 2).await.unwrap();
        assert_eq!(values, vec![0x022B, 0x0064]);
    }

    #[tokio::test]
    async fn test_tcp_exception_is_nak() {
        let (master, mut remote) = master(ModbusFraming::Tcp);
        tokio::spawn(async move {
            let mut request = [0u8; 12];
            remote.read_exact(&mut request).await.unwrap();
            let tid = u16::from_be_bytes([request[0], request[1]]);
            remote
                .write_all(&tcp::encode(tid, 0x11, &[0x84, 0x02]))
                .await
                .unwrap();
            remote
        });

        let err = assert_err!(master.read_input_registers(500, 2).await);
        assert_eq!(err.nak_code(), Some(NakCode::Modbus(ModbusException::IllegalDataAddress)));
    }

    #[tokio::test]
    async fn test_tcp_foreign_transaction_skipped() {
        let (master, mut remote) = master(ModbusFraming::Tcp);
        tokio::spawn(async move {
            let mut request = [0u8; 12];
            remote.read_exact(&mut request).await.unwrap();
            let tid = u16::from_be_bytes([request[0], request[1]]);
            let echo = [0x06, 0x00, 0x01, 0x00, 0x03];
            remote.write_all(&tcp::encode(0x7777, 0x11, &echo)).await.unwrap();
            remote.write_all(&tcp::encode(tid, 0x11, &echo)).await.unwrap();
            remote
        });

        tokio_test::assert_ok!(master.write_single_register(1, 3).await);
    }

    #[tokio::test]
    async fn test_tcp_only_foreign_transaction_times_out() {
        let (master, mut remote) = master_with_timeout(ModbusFraming::Tcp, 100);
        tokio::spawn(async move {
            let mut request = [0u8; 12];
            remote.read_exact(&mut request).await.unwrap();
            remote
                .write_all(&tcp::encode(0x7777, 0x11, &[0x06, 0x00, 0x01, 0x00, 0x03]))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            remote
        });

        let err = assert_err!(master.write_single_register(1, 3).await);
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_tcp_late_reply_does_not_poison_channel() {
        let (master, mut remote) = master_with_timeout(ModbusFraming::Tcp, 100);
        tokio::spawn(async move {
            let mut request = [0u8; 12];
            for round in 0..4u16 {
                remote.read_exact(&mut request).await.unwrap();
                if round == 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
                }
                let tid = u16::from_be_bytes([request[0], request[1]]);
                let value = (request[8] as u16) << 8 | request[9] as u16;
                let pdu = [0x03, 0x02, (value >> 8) as u8, value as u8];
                remote.write_all(&tcp::encode(tid, 0x11, &pdu)).await.unwrap();
            }
            remote
        });

        let err = assert_err!(master.read_holding_registers(10, 1).await);
        assert!(err.is_timeout());
        for address in [20, 30, 40] {
            assert_eq!(master.read_holding_registers(address, 1).await.unwrap(), vec![address]);
        }
    }

    #[tokio::test]
    async fn test_rtu_late_reply_is_drained() {
        let (master, mut remote) = master_with_timeout(ModbusFraming::Rtu, 100);
        tokio::spawn(async move {
            let mut request = [0u8; 8];
            for round in 0..3 {
                remote.read_exact(&mut request).await.unwrap();
                if round == 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
                }
                let pdu = [0x03, 0x02, request[2], request[3]];
                remote.write_all(&rtu::encode(0x11, &pdu)).await.unwrap();
            }
            remote
        });

        let err = assert_err!(master.read_holding_registers(10, 1).await);
        assert!(err.is_timeout());
        // let the late reply land in the channel buffer
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(master.read_holding_registers(20, 1).await.unwrap(), vec![20]);
        assert_eq!(master.read_holding_registers(30, 1).await.unwrap(), vec![30]);
    }

    #[tokio::test]
    async fn test_invalid_request_not_sent() {
        let (master, _remote) = master(ModbusFraming::Rtu);
        let err = assert_err!(master.read_holding_registers(0, 200).await);
        assert!(matches!(err, PlcError::InvalidData(_)));
    }
}

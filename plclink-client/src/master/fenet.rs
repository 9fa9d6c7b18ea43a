//! LS XGT FEnet master

use crate::engine::{EngineConfig, MasterProtocol, RequestEngine};
use plclink_codec::fenet::{
    FenetCodec, FenetRequest, FenetRequestBody, FenetResponse, FenetResponseBody, HEADER_LEN,
};
use plclink_codec::framing::FrameCheck;
use plclink_core::datatypes::{DeviceValue, DeviceVariable};
use plclink_core::error::{PlcError, PlcResult};
use plclink_core::nak::NakCode;
use plclink_transport::ByteChannel;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

/// [`MasterProtocol`] for FEnet
#[derive(Debug, Clone, Copy, Default)]
pub struct FenetProtocol {
    pub codec: FenetCodec,
}

impl MasterProtocol for FenetProtocol {
    type Request = FenetRequest;
    type Response = FenetResponse;

    fn encode(&self, request: &FenetRequest) -> PlcResult<Vec<u8>> {
        request.body.validate().map_err(|code| {
            PlcError::InvalidData(format!("FEnet request not sendable: {}", code.description()))
        })?;
        Ok(self.codec.encode_request(request))
    }

    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn check_response(&self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        self.codec.check(buf).map_err(NakCode::from)
    }

    fn decode(&self, frame: &[u8]) -> Result<FenetResponse, NakCode> {
        self.codec.decode_response(frame).map_err(NakCode::from)
    }

    fn nak_code(&self, response: &FenetResponse) -> Option<NakCode> {
        response.error().map(NakCode::from)
    }

    fn correlate(&self, request: &FenetRequest, response: &FenetResponse) -> PlcResult<()> {
        if response.invoke_id != request.invoke_id {
            return Err(PlcError::Correlation(format!(
                "invoke id {} answered with {}",
                request.invoke_id, response.invoke_id
            )));
        }
        if response.command != request.body.command() {
            return Err(PlcError::Correlation(format!(
                "{:?} answered with {:?}",
                request.body.command(),
                response.command
            )));
        }
        Ok(())
    }
}

/// Typed FEnet master
pub struct FenetMaster {
    engine: RequestEngine<FenetProtocol>,
    next_invoke: AtomicU16,
}

impl FenetMaster {
    pub fn new(channel: Arc<ByteChannel>, codec: FenetCodec) -> Self {
        Self::with_config(channel, codec, EngineConfig::default())
    }

    pub fn with_config(channel: Arc<ByteChannel>, codec: FenetCodec, config: EngineConfig) -> Self {
        Self {
            engine: RequestEngine::with_config(channel, FenetProtocol { codec }, config),
            next_invoke: AtomicU16::new(1),
        }
    }

    /// Send any request body under a fresh invoke id
    pub async fn request(&self, body: FenetRequestBody) -> PlcResult<FenetResponse> {
        let invoke_id = self.next_invoke.fetch_add(1, Ordering::Relaxed);
        self.engine
            .request(&FenetRequest::new(invoke_id, body))
            .await
    }

    /// Read up to 16 variables of one type
    pub async fn read(&self, variables: &[DeviceVariable]) -> PlcResult<Vec<DeviceValue>> {
        let response = self
            .request(FenetRequestBody::ReadIndividual(variables.to_vec()))
            .await?;
        let blocks = response.blocks();
        if blocks.len() != variables.len() {
            return Err(PlcError::InvalidData(format!(
                "expected {} blocks, got {}",
                variables.len(),
                blocks.len()
            )));
        }
        variables
            .iter()
            .zip(blocks)
            .map(|(variable, block)| DeviceValue::from_le_bytes(variable.data_type(), block))
            .collect()
    }

    /// Read `count` bytes starting at `variable`
    pub async fn read_continuous(&self, variable: DeviceVariable, count: u16) -> PlcResult<Vec<u8>> {
        let response = self
            .request(FenetRequestBody::ReadContinuous { variable, count })
            .await?;
        match response.blocks() {
            [data] if data.len() == count as usize => Ok(data.clone()),
            blocks => Err(PlcError::InvalidData(format!(
                "expected one block of {} bytes, got {} blocks",
                count,
                blocks.len()
            ))),
        }
    }

    pub async fn write(&self, items: &[(DeviceVariable, DeviceValue)]) -> PlcResult<()> {
        let response = self
            .request(FenetRequestBody::WriteIndividual(items.to_vec()))
            .await?;
        expect_written(&response, items.len())
    }

    /// Write little-endian device bytes starting at `variable`
    pub async fn write_continuous(&self, variable: DeviceVariable, data: &[u8]) -> PlcResult<()> {
        let response = self
            .request(FenetRequestBody::WriteContinuous {
                variable,
                data: data.to_vec(),
            })
            .await?;
        expect_written(&response, 1)
    }
}

fn expect_written(response: &FenetResponse, blocks: usize) -> PlcResult<()> {
    match response.body {
        FenetResponseBody::Write { blocks: written } if written as usize == blocks => Ok(()),
        ref body => Err(PlcError::InvalidData(format!(
            "unexpected write response: {:?}",
            body
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plclink_codec::fenet::FenetCommand;
    use plclink_core::logging::NullCommLogger;
    use plclink_core::nak::FenetError;
    use plclink_transport::ChannelKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn master() -> (FenetMaster, DuplexStream) {
        let (local, remote) = tokio::io::duplex(1024);
        let channel =
            ByteChannel::from_stream(local, ChannelKind::Stream, "fenet", Arc::new(NullCommLogger));
        let master =
            FenetMaster::with_config(Arc::new(channel), FenetCodec::new(true), EngineConfig::new(500));
        (master, remote)
    }

    async fn read_request(remote: &mut DuplexStream, codec: &FenetCodec) -> FenetRequest {
        let mut header = vec![0u8; HEADER_LEN];
        remote.read_exact(&mut header).await.unwrap();
        let length = u16::from_le_bytes([header[16], header[17]]) as usize;
        let mut body = vec![0u8; length];
        remote.read_exact(&mut body).await.unwrap();
        header.extend_from_slice(&body);
        codec.decode_request(&header).unwrap()
    }

    fn var(name: &str) -> DeviceVariable {
        DeviceVariable::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_read_words() {
        let (master, mut remote) = master();
        tokio::spawn(async move {
            let codec = FenetCodec::new(true);
            let request = read_request(&mut remote, &codec).await;
            assert_eq!(
                request.body,
                FenetRequestBody::ReadIndividual(vec![var("%MW0"), var("%MW1")])
            );
            let response = FenetResponse {
                invoke_id: request.invoke_id,
                command: FenetCommand::Read,
                data_type: 0x02,
                body: FenetResponseBody::Read(vec![vec![0x01, 0x00], vec![0xFF, 0x7F]]),
            };
            remote.write_all(&codec.encode_response(&response)).await.unwrap();
            remote
        });

        let values = master.read(&[var("%MW0"), var("%MW1")]).await.unwrap();
        assert_eq!(values, vec![DeviceValue::Word(1), DeviceValue::Word(0x7FFF)]);
    }

    #[tokio::test]
    async fn test_error_status_is_nak() {
        let (master, mut remote) = master();
        tokio::spawn(async move {
            let codec = FenetCodec::new(true);
            let request = read_request(&mut remote, &codec).await;
            let response = FenetResponse {
                invoke_id: request.invoke_id,
                command: FenetCommand::Write,
                data_type: 0x14,
                body: FenetResponseBody::Error(FenetError::AreaExceeded),
            };
            remote.write_all(&codec.encode_response(&response)).await.unwrap();
            remote
        });

        let err = master.write_continuous(var("%MB0"), &[1, 2]).await.unwrap_err();
        assert_eq!(err.nak_code(), Some(NakCode::Fenet(FenetError::AreaExceeded)));
    }

    #[tokio::test]
    async fn test_response_for_other_invoke_id_skipped() {
        let (master, mut remote) = master();
        tokio::spawn(async move {
            let codec = FenetCodec::new(true);
            let request = read_request(&mut remote, &codec).await;
            let mut response = FenetResponse {
                invoke_id: request.invoke_id.wrapping_add(1),
                command: FenetCommand::Write,
                data_type: 0x02,
                body: FenetResponseBody::Write { blocks: 1 },
            };
            remote.write_all(&codec.encode_response(&response)).await.unwrap();
            response.invoke_id = request.invoke_id;
            remote.write_all(&codec.encode_response(&response)).await.unwrap();
            remote
        });

        master
            .write(&[(var("%MW0"), DeviceValue::Word(5))])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_only_other_invoke_id_times_out() {
        let (master, mut remote) = master();
        tokio::spawn(async move {
            let codec = FenetCodec::new(true);
            let request = read_request(&mut remote, &codec).await;
            let response = FenetResponse {
                invoke_id: request.invoke_id.wrapping_add(1),
                command: FenetCommand::Write,
                data_type: 0x02,
                body: FenetResponseBody::Write { blocks: 1 },
            };
            remote.write_all(&codec.encode_response(&response)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            remote
        });

        let err = master
            .write(&[(var("%MW0"), DeviceValue::Word(5))])
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}

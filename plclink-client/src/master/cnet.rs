//! LS XGT Cnet master

use crate::engine::{EngineConfig, MasterProtocol, RequestEngine};
use plclink_codec::cnet::request::CnetRead;
use plclink_codec::cnet::{CnetRequest, CnetRequestBody, CnetResponse, CnetResponsePayload};
use plclink_codec::framing::FrameCheck;
use plclink_core::datatypes::{DataType, DeviceValue, DeviceVariable};
use plclink_core::error::{PlcError, PlcResult};
use plclink_core::nak::NakCode;
use plclink_transport::ByteChannel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// [`MasterProtocol`] for Cnet
#[derive(Debug, Clone, Copy, Default)]
pub struct CnetProtocol;

impl MasterProtocol for CnetProtocol {
    type Request = CnetRequest;
    type Response = CnetResponse;

    fn encode(&self, request: &CnetRequest) -> PlcResult<Vec<u8>> {
        request
            .validate()
            .map_err(|code| PlcError::InvalidData(format!("Cnet request not sendable: {}", code.description())))?;
        Ok(request.encode())
    }

    fn header_len(&self) -> usize {
        1
    }

    fn check_response(&self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        CnetResponse::check(buf).map_err(NakCode::from)
    }

    fn decode(&self, frame: &[u8]) -> Result<CnetResponse, NakCode> {
        CnetResponse::decode(frame).map_err(NakCode::from)
    }

    fn nak_code(&self, response: &CnetResponse) -> Option<NakCode> {
        response.nak_code().map(NakCode::from)
    }

    fn correlate(&self, request: &CnetRequest, response: &CnetResponse) -> PlcResult<()> {
        let header = &response.header;
        if header.station != request.station {
            return Err(PlcError::Correlation(format!(
                "station {:02X} answered by station {:02X}",
                request.station, header.station
            )));
        }
        if header.command != request.command() {
            return Err(PlcError::Correlation(format!(
                "{:?} answered with {:?}",
                request.command(),
                header.command
            )));
        }
        Ok(())
    }
}

/// Typed Cnet master for one station
///
/// Remembers the reads registered under each monitor number so that
/// [`execute_monitor`](Self::execute_monitor) can type the returned data.
pub struct CnetMaster {
    engine: RequestEngine<CnetProtocol>,
    station: u8,
    use_bcc: bool,
    monitors: Mutex<HashMap<u8, CnetRead>>,
}

impl CnetMaster {
    pub fn new(channel: Arc<ByteChannel>, station: u8) -> Self {
        Self::with_config(channel, station, EngineConfig::default())
    }

    pub fn with_config(channel: Arc<ByteChannel>, station: u8, config: EngineConfig) -> Self {
        Self {
            engine: RequestEngine::with_config(channel, CnetProtocol, config),
            station,
            use_bcc: false,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Send lower-case commands with a trailing BCC
    pub fn with_bcc(mut self, use_bcc: bool) -> Self {
        self.use_bcc = use_bcc;
        self
    }

    pub fn station(&self) -> u8 {
        self.station
    }

    /// Send any request body to this station
    pub async fn request(&self, body: CnetRequestBody) -> PlcResult<CnetResponse> {
        let request = CnetRequest::new(self.station, body).with_bcc(self.use_bcc);
        self.engine.request(&request).await
    }

    /// `RSS`: read up to 16 variables of one type
    pub async fn read(&self, variables: &[DeviceVariable]) -> PlcResult<Vec<DeviceValue>> {
        let read = CnetRead::Individual(variables.to_vec());
        let response = self.request(CnetRequestBody::Read(read.clone())).await?;
        values_of(&read, &response)
    }

    /// `RSB`: read `count` items starting at `variable`
    pub async fn read_continuous(
        &self,
        variable: DeviceVariable,
        count: u8,
    ) -> PlcResult<Vec<DeviceValue>> {
        let read = CnetRead::Continuous { variable, count };
        let response = self.request(CnetRequestBody::Read(read.clone())).await?;
        values_of(&read, &response)
    }

    /// `WSS`
    pub async fn write(&self, items: &[(DeviceVariable, DeviceValue)]) -> PlcResult<()> {
        self.request(CnetRequestBody::WriteIndividual(items.to_vec()))
            .await
            .map(|_| ())
    }

    /// `WSB`: values take the type of `variable`
    pub async fn write_continuous(
        &self,
        variable: DeviceVariable,
        values: &[DeviceValue],
    ) -> PlcResult<()> {
        self.request(CnetRequestBody::WriteContinuous {
            variable,
            values: values.to_vec(),
        })
        .await
        .map(|_| ())
    }

    /// `X##`: register `read` under `monitor`
    pub async fn register_monitor(&self, monitor: u8, read: CnetRead) -> PlcResult<()> {
        self.request(CnetRequestBody::RegisterMonitor {
            monitor,
            read: read.clone(),
        })
        .await?;
        self.monitors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(monitor, read);
        Ok(())
    }

    /// `Y##`: run the read registered under `monitor`
    pub async fn execute_monitor(&self, monitor: u8) -> PlcResult<Vec<DeviceValue>> {
        let read = self
            .monitors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&monitor)
            .cloned()
            .ok_or_else(|| {
                PlcError::InvalidState(format!("monitor {:02X} was not registered", monitor))
            })?;
        let response = self
            .request(CnetRequestBody::ExecuteMonitor { monitor })
            .await?;
        values_of(&read, &response)
    }
}

/// Split big-endian response blocks into values of the read's type
fn values_of(read: &CnetRead, response: &CnetResponse) -> PlcResult<Vec<DeviceValue>> {
    let CnetResponsePayload::Blocks(blocks) = &response.payload else {
        return Err(PlcError::InvalidData("Cnet response carries no data".to_string()));
    };
    let data_type = read.data_type().unwrap_or(DataType::Word);
    match read {
        CnetRead::Individual(variables) => {
            if blocks.len() != variables.len() {
                return Err(PlcError::InvalidData(format!(
                    "expected {} blocks, got {}",
                    variables.len(),
                    blocks.len()
                )));
            }
            blocks
                .iter()
                .map(|block| DeviceValue::from_be_bytes(data_type, block))
                .collect()
        }
        CnetRead::Continuous { count, .. } => {
            let data = blocks.first().map(Vec::as_slice).unwrap_or_default();
            if data.len() != *count as usize * data_type.size() {
                return Err(PlcError::InvalidData(format!(
                    "expected {} items of {:?}, got {} bytes",
                    count,
                    data_type,
                    data.len()
                )));
            }
            data.chunks(data_type.size())
                .map(|item| DeviceValue::from_be_bytes(data_type, item))
                .collect()
        }
    }
}

//! LS XGT Cnet slave

use super::{FrameOutcome, SlaveProtocol};
use crate::handler::{
    swap_items, DeviceRead, DeviceReadContext, DeviceReadResult, DeviceRequestHandler, DeviceWrite,
    DeviceWriteContext,
};
use plclink_codec::cnet::{CnetHeader, CnetRead, CnetRequest, CnetRequestBody, CnetResponse};
use plclink_codec::framing::FrameCheck;
use plclink_core::datatypes::DataType;
use plclink_core::nak::{CnetError, NakCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct CnetSlave {
    /// Answer only this station; `None` answers every station
    station: Option<u8>,
    handler: Arc<dyn DeviceRequestHandler>,
    monitors: Mutex<HashMap<u8, CnetRead>>,
}

impl CnetSlave {
    pub fn new(handler: Arc<dyn DeviceRequestHandler>) -> Self {
        Self {
            station: None,
            handler,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_station(mut self, station: u8) -> Self {
        self.station = Some(station);
        self
    }

    fn accepts(&self, station: u8) -> bool {
        self.station.is_none_or(|own| own == station)
    }

    fn respond(&self, request: CnetRequest) -> CnetResponse {
        let header = request.header();
        match request.body {
            CnetRequestBody::Read(read) => self.read(header, &read),
            CnetRequestBody::WriteIndividual(items) => {
                self.write(header, DeviceWrite::Individual(items))
            }
            CnetRequestBody::WriteContinuous { variable, values } => {
                let data = values.iter().flat_map(|value| value.to_le_bytes()).collect();
                self.write(header, DeviceWrite::Continuous { variable, data })
            }
            CnetRequestBody::RegisterMonitor { monitor, read } => {
                self.monitors
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(monitor, read);
                CnetResponse::ack(header)
            }
            CnetRequestBody::ExecuteMonitor { monitor } => {
                let read = self
                    .monitors
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .get(&monitor)
                    .cloned();
                match read {
                    Some(read) => self.read(header, &read),
                    None => CnetResponse::nak(header, CnetError::MonitorNotRegistered),
                }
            }
        }
    }

    fn read(&self, header: CnetHeader, read: &CnetRead) -> CnetResponse {
        let request = match read {
            CnetRead::Individual(variables) => DeviceRead::Individual(variables.clone()),
            CnetRead::Continuous { variable, count } => DeviceRead::Continuous {
                variable: *variable,
                len: *count as usize * variable.data_type().size(),
            },
        };
        let mut context = DeviceReadContext::new(request);
        self.handler.on_read(&mut context);

        match context.result() {
            Ok(DeviceReadResult::Values(values)) => CnetResponse::blocks(
                header,
                values.iter().map(|value| value.to_be_bytes()).collect(),
            ),
            Ok(DeviceReadResult::Data(data)) => {
                let data_type = read.data_type().unwrap_or(DataType::Byte);
                CnetResponse::blocks(header, vec![swap_items(&data, data_type)])
            }
            Err(fault) => CnetResponse::nak(header, fault.cnet_code()),
        }
    }

    fn write(&self, header: CnetHeader, request: DeviceWrite) -> CnetResponse {
        let mut context = DeviceWriteContext::new(request);
        self.handler.on_write(&mut context);
        match context.fault() {
            Some(fault) => CnetResponse::nak(header, fault.cnet_code()),
            None => CnetResponse::ack(header),
        }
    }
}

impl SlaveProtocol for CnetSlave {
    fn name(&self) -> &'static str {
        "Cnet"
    }

    fn header_len(&self) -> usize {
        1
    }

    fn check_request(&self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        CnetRequest::check(buf).map_err(NakCode::from)
    }

    fn handle_frame(&self, frame: &[u8]) -> FrameOutcome {
        let request = match CnetRequest::decode(frame) {
            Ok(request) => request,
            Err(code) => {
                let code = NakCode::from(code);
                return FrameOutcome::Rejected {
                    code,
                    response: self.reject(frame, code),
                };
            }
        };
        if !self.accepts(request.station) {
            return FrameOutcome::Ignored;
        }
        FrameOutcome::Handled(Some(self.respond(request).encode()))
    }

    fn reject(&self, partial: &[u8], code: NakCode) -> Option<Vec<u8>> {
        let NakCode::Cnet(code) = code else {
            return None;
        };
        let header = CnetHeader::peek(partial)?;
        if !self.accepts(header.station) {
            return None;
        }
        Some(CnetResponse::nak(header, code).encode())
    }
}

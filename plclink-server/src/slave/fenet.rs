//! LS XGT FEnet slave

use super::{FrameOutcome, SlaveProtocol};
use crate::handler::{
    DeviceRead, DeviceReadContext, DeviceReadResult, DeviceRequestHandler, DeviceWrite,
    DeviceWriteContext,
};
use plclink_codec::fenet::{
    FenetCodec, FenetRequest, FenetRequestBody, FenetResponse, FenetResponseBody, HEADER_LEN,
};
use plclink_codec::framing::FrameCheck;
use plclink_core::nak::NakCode;
use std::sync::Arc;

pub struct FenetSlave {
    codec: FenetCodec,
    handler: Arc<dyn DeviceRequestHandler>,
}

impl FenetSlave {
    pub fn new(codec: FenetCodec, handler: Arc<dyn DeviceRequestHandler>) -> Self {
        Self { codec, handler }
    }

    fn respond(&self, request: FenetRequest) -> FenetResponse {
        let command = request.body.command();
        let data_type = request.body.data_type().code();
        let body = match request.body {
            FenetRequestBody::ReadIndividual(variables) => {
                self.read(DeviceRead::Individual(variables))
            }
            FenetRequestBody::ReadContinuous { variable, count } => {
                self.read(DeviceRead::Continuous {
                    variable,
                    len: count as usize,
                })
            }
            FenetRequestBody::WriteIndividual(items) => {
                let blocks = items.len() as u16;
                self.write(DeviceWrite::Individual(items), blocks)
            }
            FenetRequestBody::WriteContinuous { variable, data } => {
                self.write(DeviceWrite::Continuous { variable, data }, 1)
            }
        };
        FenetResponse {
            invoke_id: request.invoke_id,
            command,
            data_type,
            body,
        }
    }

    fn read(&self, request: DeviceRead) -> FenetResponseBody {
        let mut context = DeviceReadContext::new(request);
        self.handler.on_read(&mut context);
        match context.result() {
            Ok(DeviceReadResult::Values(values)) => {
                FenetResponseBody::Read(values.iter().map(|value| value.to_le_bytes()).collect())
            }
            Ok(DeviceReadResult::Data(data)) => FenetResponseBody::Read(vec![data]),
            Err(fault) => FenetResponseBody::Error(fault.fenet_code()),
        }
    }

    fn write(&self, request: DeviceWrite, blocks: u16) -> FenetResponseBody {
        let mut context = DeviceWriteContext::new(request);
        self.handler.on_write(&mut context);
        match context.fault() {
            Some(fault) => FenetResponseBody::Error(fault.fenet_code()),
            None => FenetResponseBody::Write { blocks },
        }
    }
}

impl SlaveProtocol for FenetSlave {
    fn name(&self) -> &'static str {
        "FEnet"
    }

    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn check_request(&self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        self.codec.check(buf).map_err(NakCode::from)
    }

    fn handle_frame(&self, frame: &[u8]) -> FrameOutcome {
        match self.codec.decode_request(frame) {
            Ok(request) => {
                let response = self.respond(request);
                FrameOutcome::Handled(Some(self.codec.encode_response(&response)))
            }
            Err(code) => FrameOutcome::Rejected {
                code: code.into(),
                response: Some(self.codec.encode_response(&self.codec.reject(frame, code))),
            },
        }
    }

    fn reject(&self, partial: &[u8], code: NakCode) -> Option<Vec<u8>> {
        match code {
            NakCode::Fenet(code) => {
                Some(self.codec.encode_response(&self.codec.reject(partial, code)))
            }
            _ => None,
        }
    }
}

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::thread;

use common::{link, Wire};
use tilink_proto::vars;
use tilink_proto::{
    Calc, CommandId, Device, DeviceHandler, Endpoint, Error, MsgHeader, PollMode, ReplyPayload,
    StagedReply, VarType,
};

/// Handler that records everything it is told and serves a fixed staged
/// variable.
#[derive(Default)]
struct Recorder {
    received: Vec<(u8, Endpoint, Vec<u8>, Vec<u8>)>,
    staged_header: Vec<u8>,
    staged_data: Vec<u8>,
}

impl DeviceHandler for Recorder {
    fn data_received(
        &mut self,
        vartype: u8,
        model: Endpoint,
        header: &[u8],
        data: &[u8],
    ) -> Result<(), Error> {
        self.received
            .push((vartype, model, header.to_vec(), data.to_vec()));
        Ok(())
    }

    fn data_requested(
        &mut self,
        _vartype: u8,
        _model: Endpoint,
        header: &mut [u8],
        _header_len: usize,
        data: &mut [u8],
    ) -> Result<StagedReply, Error> {
        header[..self.staged_header.len()].copy_from_slice(&self.staged_header);
        data[..self.staged_data.len()].copy_from_slice(&self.staged_data);
        Ok(StagedReply {
            header_len: self.staged_header.len(),
            data_len: self.staged_data.len(),
            payload: ReplyPayload::Buffered,
        })
    }
}

/// Handler that generates its payload byte by byte instead of staging it.
struct Generator {
    len: usize,
}

impl DeviceHandler for Generator {
    fn data_received(
        &mut self,
        _vartype: u8,
        _model: Endpoint,
        _header: &[u8],
        _data: &[u8],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn data_requested(
        &mut self,
        _vartype: u8,
        _model: Endpoint,
        _header: &mut [u8],
        header_len: usize,
        _data: &mut [u8],
    ) -> Result<StagedReply, Error> {
        Ok(StagedReply {
            header_len,
            data_len: self.len,
            payload: ReplyPayload::Generated,
        })
    }

    fn payload_byte(&mut self, index: usize) -> u8 {
        (index as u8).wrapping_mul(7).wrapping_add(3)
    }
}

#[test]
fn get_variable_from_device() -> anyhow::Result<()> {
    common::init_logging();

    let wire = Wire::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let responder = thread::spawn({
        let wire = Arc::clone(&wire);
        let shutdown = Arc::clone(&shutdown);
        move || {
            let mut header = [0u8; 16];
            let mut data = [0u8; 64];
            let mut device = Device::new(link(&wire, 1), &mut header, &mut data);

            let mut real = [0u8; vars::REAL_MAX_LEN];
            let len = vars::i64_to_real(1234, &mut real, Endpoint::Calc85b).unwrap();

            let mut handler = Recorder::default();
            handler.staged_header = vec![0, 0, VarType::Real as u8, b'T', 0, 0, 0, 0, 0, 0, 0];
            handler.staged_data = real[..len].to_vec();

            while !shutdown.load(SeqCst) {
                device.tick(&mut handler, PollMode::Quick).unwrap();
            }
        }
    });

    let mut calc = Calc::new(link(&wire, 0));
    let mut header = [0u8; 16];
    header[2] = VarType::Real as u8;
    header[3] = b'T';
    let mut data = [0u8; 64];
    let got = calc.get_var(VarType::Real, &mut header, &mut data)?;

    assert_eq!(got.header_len, 11);
    assert_eq!(got.data_len, 10);
    // The responder wrote the payload length into the header's size word
    // and kept the type/name tail the handler staged.
    assert_eq!(&header[..4], &[10, 0, VarType::Real as u8, b'T']);
    let value = vars::real_to_i64(&data[..got.data_len], Endpoint::Calc85b)?;
    assert_eq!(value, 1234);

    shutdown.store(true, SeqCst);
    responder.join().unwrap();
    assert!(wire.lines_idle());
    Ok(())
}

#[test]
fn get_generated_payload_from_device() -> anyhow::Result<()> {
    common::init_logging();

    let wire = Wire::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let responder = thread::spawn({
        let wire = Arc::clone(&wire);
        let shutdown = Arc::clone(&shutdown);
        move || {
            let mut header = [0u8; 16];
            let mut data = [0u8; 64];
            let mut device = Device::new(link(&wire, 1), &mut header, &mut data);
            let mut handler = Generator { len: 24 };

            while !shutdown.load(SeqCst) {
                device.tick(&mut handler, PollMode::Quick).unwrap();
            }
        }
    });

    let mut calc = Calc::new(link(&wire, 0));
    let mut header = [0u8; 16];
    header[2] = VarType::Real as u8;
    let mut data = [0u8; 64];
    let got = calc.get_var(VarType::Real, &mut header, &mut data)?;

    assert_eq!(got.data_len, 24);
    for (index, &byte) in data[..got.data_len].iter().enumerate() {
        assert_eq!(byte, (index as u8).wrapping_mul(7).wrapping_add(3));
    }

    shutdown.store(true, SeqCst);
    responder.join().unwrap();
    assert!(wire.lines_idle());
    Ok(())
}

#[test]
fn send_variable_to_device() -> anyhow::Result<()> {
    common::init_logging();

    let wire = Wire::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let responder = thread::spawn({
        let wire = Arc::clone(&wire);
        let shutdown = Arc::clone(&shutdown);
        move || {
            let mut header = [0u8; 16];
            let mut data = [0u8; 64];
            let mut device = Device::new(link(&wire, 1), &mut header, &mut data);
            let mut handler = Recorder::default();

            while !shutdown.load(SeqCst) {
                device.tick(&mut handler, PollMode::Quick).unwrap();
            }
            handler.received
        }
    });

    let mut real = [0u8; vars::REAL_MAX_LEN];
    let len = vars::f64_to_real(6.25, &mut real, Endpoint::Calc85b)?;
    let var_header = [len as u8, 0, VarType::Real as u8, b'X', 0, 0, 0, 0, 0, 0, 0];

    let mut calc = Calc::new(link(&wire, 0));
    calc.send_var(VarType::Real, &var_header, &real[..len])?;

    shutdown.store(true, SeqCst);
    let received = responder.join().unwrap();
    assert!(wire.lines_idle());

    // The handler observed exactly the payload we pushed.
    assert_eq!(received.len(), 1);
    let (vartype, model, header, data) = &received[0];
    assert_eq!(*vartype, VarType::Real as u8);
    assert_eq!(*model, Endpoint::Calc85b);
    assert_eq!(header.as_slice(), &var_header);
    assert_eq!(data.as_slice(), &real[..len]);
    Ok(())
}

#[test]
fn received_header_is_normalized_before_the_callback() -> anyhow::Result<()> {
    common::init_logging();

    let wire = Wire::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let responder = thread::spawn({
        let wire = Arc::clone(&wire);
        let shutdown = Arc::clone(&shutdown);
        move || {
            let mut header = [0u8; 16];
            let mut data = [0u8; 64];
            let mut device = Device::new(link(&wire, 1), &mut header, &mut data);
            let mut handler = Recorder::default();

            while !shutdown.load(SeqCst) {
                device.tick(&mut handler, PollMode::Quick).unwrap();
            }
            handler.received
        }
    });

    // A list goes out under the TI-82 identifier; its header carries the
    // family-82 "real" tag with the 0xAA string name byte.
    let var_header = [2, 0, 0x00, 0xAA, 0x30, 0, 0, 0, 0, 0, 0];
    let payload = [0x01u8, 0x00];

    let mut calc = Calc::new(link(&wire, 0));
    calc.send_var(VarType::RealList, &var_header, &payload)?;

    shutdown.store(true, SeqCst);
    let received = responder.join().unwrap();

    assert_eq!(received.len(), 1);
    let (vartype, model, header, _data) = &received[0];
    assert_eq!(*model, Endpoint::Calc82);
    // The callback saw the canonical string tag, not the raw 0x00.
    assert_eq!(*vartype, VarType::String as u8);
    assert_eq!(header[2], VarType::String as u8);
    assert_eq!(header[3], 0xAA);
    Ok(())
}

#[test]
fn cts_without_request_is_not_configured() {
    common::init_logging();

    let wire = Wire::new();
    let responder = thread::spawn({
        let wire = Arc::clone(&wire);
        move || {
            let mut header = [0u8; 16];
            let mut data = [0u8; 32];
            let mut device = Device::new(link(&wire, 1), &mut header, &mut data);
            device.tick(&mut Recorder::default(), PollMode::Wait)
        }
    });

    let mut raw = link(&wire, 0);
    raw.send(&MsgHeader::new(Endpoint::Calc83, CommandId::Cts, 0), &[])
        .unwrap();
    // The device still ACKs before noticing nothing was staged.
    let (reply, len) = raw.get(&mut []).unwrap();
    assert_eq!(reply.command(), Some(CommandId::Ack));
    assert_eq!(len, 0);

    assert_eq!(responder.join().unwrap(), Err(Error::NotConfigured));
    assert!(wire.lines_idle());
}

#[test]
fn unknown_sender_aborts_tick() {
    common::init_logging();

    let wire = Wire::new();
    let responder = thread::spawn({
        let wire = Arc::clone(&wire);
        move || {
            let mut header = [0u8; 16];
            let mut data = [0u8; 32];
            let mut device = Device::new(link(&wire, 1), &mut header, &mut data);
            device.tick(&mut Recorder::default(), PollMode::Wait)
        }
    });

    // A computer-side 89/92 identifier is not a sender the device answers.
    let mut raw = link(&wire, 0);
    raw.send(
        &MsgHeader::new(Endpoint::Comp89, CommandId::Rts, 3),
        &[0x09, 0x00, 0x00],
    )
    .unwrap();

    assert_eq!(responder.join().unwrap(), Err(Error::Invalid));
    assert!(wire.lines_idle());
}

//! BleMicStreamer - firmware entry point
//!
//! 1. Bring up log UART, BLE stack and I2S
//! 2. Start the streaming task pinned to `CONFIG.stream_core`
//! 3. Run the control loop here: link supervision, fault reports, log drain

#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;
use core::ffi::c_void;

use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys as esp_idf_sys;

use ble_mic_streamer::{
    bringup,
    clock::Clock,
    connection::ConnectionState,
    fault::{FaultCode, FaultState},
    hal::{init_log_uart, BleServer, FreeRtosClock, I2sMicrophone},
    log_drain::LogDrain,
    rt_error, rt_info, rt_warn,
    streaming::StreamingTask,
    supervisor::LinkSupervisor,
    BlockReader, CONFIG, RADIO_LOG, STREAM_LOG,
};

type Streamer = StreamingTask<'static, BlockReader<I2sMicrophone>, BleServer, FreeRtosClock>;

static LINK: ConnectionState = ConnectionState::new();
static FAULT: FaultState = FaultState::new();

/// Control loop period.
const CONTROL_TICK_MS: u32 = 20;

/// Interval between repeated fault reports.
const FAULT_REPORT_INTERVAL_US: i64 = 5_000_000;

/// FreeRTOS `pdPASS`.
const PD_PASS: i32 = 1;

#[no_mangle]
fn main() {
    // Initialize ESP-IDF
    esp_idf_sys::link_patches();

    let mut clock = FreeRtosClock::new();

    let Ok(peripherals) = Peripherals::take() else {
        idle_forever(&mut clock);
    };
    let Ok(mut log_uart) = init_log_uart(peripherals.uart1, peripherals.pins.gpio17) else {
        idle_forever(&mut clock);
    };
    let mut drain = LogDrain::new(&STREAM_LOG, &RADIO_LOG);

    rt_info!(
        RADIO_LOG,
        clock.now_us(),
        "{} mode={}",
        env!("VERSION_STRING"),
        CONFIG.mode.as_str()
    );

    let ble = match EspDefaultNvsPartition::take()
        .and_then(|nvs| BleServer::new(peripherals.modem, nvs, &LINK))
    {
        Ok(ble) => Some(ble),
        Err(err) => {
            FAULT.set(FaultCode::ServiceStart, err.code() as u32);
            rt_error!(RADIO_LOG, clock.now_us(), "BLE init failed ({})", err.code());
            None
        }
    };

    let mut supervisor = LinkSupervisor::new(&CONFIG, &LINK, &FAULT, &RADIO_LOG);

    if let Some(ble) = ble.as_ref() {
        let mut acquisition = BlockReader::new(I2sMicrophone::new(peripherals.i2s0));
        let mut transport = ble.clone();
        match bringup::start(&CONFIG, &mut acquisition, &mut transport, &mut clock, &FAULT, &RADIO_LOG) {
            Ok(started) => {
                if !started.is_advertising() {
                    supervisor.request_advertising(clock.now_ms());
                }
                spawn_streaming(acquisition, transport, &clock);
            }
            Err(err) => rt_error!(RADIO_LOG, clock.now_us(), "start-up failed: {}", err),
        }
    }

    let mut advertiser = ble;
    let mut last_fault_report_us = i64::MIN / 2;

    loop {
        let now_us = clock.now_us();

        if let Some(advertiser) = advertiser.as_mut() {
            supervisor.poll(advertiser, clock.now_ms());
        }

        if FAULT.is_active() && now_us - last_fault_report_us >= FAULT_REPORT_INTERVAL_US {
            let fault = FAULT.snapshot();
            rt_warn!(
                RADIO_LOG,
                now_us,
                "fault: {} data={} total={}",
                fault.code.as_str(),
                fault.data,
                fault.count
            );
            last_fault_report_us = now_us;
        }

        drain.drain_once(&mut log_uart, now_us);
        clock.delay_ms(CONTROL_TICK_MS);
    }
}

/// Hand the streaming task to its own core.
fn spawn_streaming(acquisition: BlockReader<I2sMicrophone>, transport: BleServer, clock: &FreeRtosClock) {
    let task = match Streamer::new(
        CONFIG,
        acquisition,
        transport,
        FreeRtosClock::new(),
        &LINK,
        &FAULT,
        &STREAM_LOG,
    ) {
        Ok(task) => task,
        Err(err) => {
            FAULT.set(FaultCode::InvalidConfig, 0);
            rt_error!(RADIO_LOG, clock.now_us(), "streaming not started: {}", err);
            return;
        }
    };

    let task = Box::into_raw(Box::new(task));

    // SAFETY: the task entry takes ownership of the boxed task; the name is
    // a static C string
    let created = unsafe {
        esp_idf_sys::xTaskCreatePinnedToCore(
            Some(streaming_entry),
            c"streaming".as_ptr(),
            CONFIG.stream_stack_bytes,
            task.cast::<c_void>(),
            CONFIG.stream_priority,
            core::ptr::null_mut(),
            CONFIG.stream_core,
        )
    };

    if created != PD_PASS {
        // SAFETY: the task was not created, the box is still ours
        drop(unsafe { Box::from_raw(task) });
        rt_error!(RADIO_LOG, clock.now_us(), "streaming task create failed");
    }
}

/// Streaming task (pinned to `CONFIG.stream_core`).
unsafe extern "C" fn streaming_entry(arg: *mut c_void) {
    // SAFETY: arg is the box leaked by spawn_streaming, owned by this task
    let task = unsafe { &mut *arg.cast::<Streamer>() };
    task.run()
}

/// Nothing usable came up; keep the watchdog fed.
fn idle_forever(clock: &mut FreeRtosClock) -> ! {
    loop {
        clock.delay_ms(1000);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dvbcore::config::{Config, Modulation};
    use dvbcore::controller::testing::MockDriver;
    use dvbcore::controller::{DriverSet, StreamController};

    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

    fn pat_section(entries: &[(u16, u16)]) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x01, 0xC1, 0x00, 0x00];
        for (program_number, pid) in entries {
            bytes.push((program_number >> 8) as u8);
            bytes.push(*program_number as u8);
            bytes.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            bytes.push(*pid as u8);
        }
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let section_length = (bytes.len() - 3) as u16;
        bytes[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        bytes[2] = section_length as u8;
        bytes
    }

    fn pmt_section(program_number: u16, video_pid: u16, audio_pid: u16) -> Vec<u8> {
        let mut bytes = vec![
            0x02, 0x00, 0x00, (program_number >> 8) as u8, program_number as u8, 0xC1, 0x00, 0x00, 0xE1, 0x00, 0xF0,
            0x00,
        ];
        bytes.push(0x02);
        bytes.push((video_pid >> 8) as u8);
        bytes.push(video_pid as u8);
        bytes.push(0xF0);
        bytes.push(0x00);
        bytes.push(0x04);
        bytes.push((audio_pid >> 8) as u8);
        bytes.push(audio_pid as u8);
        bytes.push(0xF0);
        bytes.push(0x00);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let section_length = (bytes.len() - 3) as u16;
        bytes[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        bytes[2] = section_length as u8;
        bytes
    }

    #[tokio::test]
    async fn full_acquisition_sequence_then_channel_change() {
        let mock = MockDriver::new();
        let drivers = DriverSet {
            tuner: mock.clone(),
            player: mock.clone(),
            demux: mock.clone(),
        };
        let config = Config {
            frequency: 754_000_000,
            bandwidth: 8,
            module: Modulation::DvbT2,
            program_number: 1,
        };

        let (controller, _worker) = StreamController::init(drivers, config);

        // Broadcast program numbers are ordinary, non-contiguous ids (NIT=0,
        // then 305/410), not a 0..N sequence -- channel-change must resolve
        // them positionally, not by searching for these values.
        mock.push_locked();
        mock.push_section(pat_section(&[(0, 0x0010), (305, 0x0100), (410, 0x0200)]));
        mock.push_section(pmt_section(305, 0x1001, 0x1002));

        let first = tokio::time::timeout(ACQUIRE_TIMEOUT, controller.channel_acquired())
            .await
            .expect("initial acquisition should complete")
            .unwrap();
        assert_eq!(first.program_number, 1);
        assert_eq!(first.video_pid, Some(0x1001));
        assert_eq!(first.audio_pid, Some(0x1002));
        assert_eq!(controller.channel_count(), 2);

        // Change to channel position 2 (broadcast program number 410); a
        // fresh PMT must be awaited again.
        mock.push_section(pmt_section(410, 0x2001, 0x2002));
        controller.change_channel(2).unwrap();

        let second = tokio::time::timeout(ACQUIRE_TIMEOUT, controller.channel_acquired())
            .await
            .expect("channel change should complete")
            .unwrap();
        assert_eq!(second.program_number, 2);
        assert_eq!(second.video_pid, Some(0x2001));
        assert_eq!(controller.current_channel().program_number, 2);

        controller.deinit().unwrap();
    }

    #[tokio::test]
    async fn channel_up_wraps_to_first_channel() {
        let mock = MockDriver::new();
        let drivers = DriverSet {
            tuner: mock.clone(),
            player: mock.clone(),
            demux: mock.clone(),
        };
        let config = Config {
            frequency: 754_000_000,
            bandwidth: 8,
            module: Modulation::DvbT2,
            program_number: 2,
        };

        let (controller, _worker) = StreamController::init(drivers, config);

        mock.push_locked();
        mock.push_section(pat_section(&[(0, 0x0010), (305, 0x0100), (410, 0x0200)]));
        mock.push_section(pmt_section(410, 0x3001, 0x3002));
        tokio::time::timeout(ACQUIRE_TIMEOUT, controller.channel_acquired())
            .await
            .expect("initial acquisition should complete")
            .unwrap();

        mock.push_section(pmt_section(305, 0x4001, 0x4002));
        controller.channel_up().unwrap();
        let wrapped = tokio::time::timeout(ACQUIRE_TIMEOUT, controller.channel_acquired())
            .await
            .expect("wrap-around acquisition should complete")
            .unwrap();
        assert_eq!(wrapped.program_number, 1);
    }
}

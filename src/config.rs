#[derive(Debug, Clone)]
pub struct Config {
    // 电视身份（IP/MAC 等）
    pub tv_app_name: &'static str,
    pub tv_ip_addr: &'static str,
    pub tv_mac_addr: &'static str,
    pub tv_port: u16,
    pub tv_status_port: u16,
    pub tv_subnet: &'static str,
    pub tv_debug: bool,

    // 麦克风采集
    pub audio_device_index: usize,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    pub audio_sample_bits: u32,
    pub audio_scale: f64,

    // 音量控制边界
    pub control_low: f64,
    pub control_high: f64,
    pub control_low_hysteresis: f64,
    pub control_high_hysteresis: f64,
    pub control_max_volume: i32,
    pub control_initial_volume: i32,

    /// Where the driver keeps the pairing token between runs.
    pub token_file: &'static str,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            tv_app_name: env!("TV_APP_NAME"),
            tv_ip_addr: env!("TV_IP_ADDR"),
            tv_mac_addr: env!("TV_MAC_ADDR"),
            tv_port: env!("TV_PORT").parse()
                .map_err(|_| "Failed to parse TV_PORT")?,
            tv_status_port: env!("TV_STATUS_PORT").parse()
                .map_err(|_| "Failed to parse TV_STATUS_PORT")?,
            tv_subnet: env!("TV_SUBNET"),
            tv_debug: env!("TV_DEBUG").parse()
                .map_err(|_| "Failed to parse TV_DEBUG")?,

            audio_device_index: env!("AUDIO_DEVICE_INDEX").parse()
                .map_err(|_| "Failed to parse AUDIO_DEVICE_INDEX")?,
            audio_sample_rate: env!("AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse AUDIO_SAMPLE_RATE")?,
            audio_channels: env!("AUDIO_CHANNELS").parse()
                .map_err(|_| "Failed to parse AUDIO_CHANNELS")?,
            audio_sample_bits: env!("AUDIO_SAMPLE_BITS").parse()
                .map_err(|_| "Failed to parse AUDIO_SAMPLE_BITS")?,
            audio_scale: env!("AUDIO_SCALE").parse()
                .map_err(|_| "Failed to parse AUDIO_SCALE")?,

            control_low: env!("CONTROL_LOW").parse()
                .map_err(|_| "Failed to parse CONTROL_LOW")?,
            control_high: env!("CONTROL_HIGH").parse()
                .map_err(|_| "Failed to parse CONTROL_HIGH")?,
            control_low_hysteresis: env!("CONTROL_LOW_HYSTERESIS").parse()
                .map_err(|_| "Failed to parse CONTROL_LOW_HYSTERESIS")?,
            control_high_hysteresis: env!("CONTROL_HIGH_HYSTERESIS").parse()
                .map_err(|_| "Failed to parse CONTROL_HIGH_HYSTERESIS")?,
            control_max_volume: env!("CONTROL_MAX_VOLUME").parse()
                .map_err(|_| "Failed to parse CONTROL_MAX_VOLUME")?,
            control_initial_volume: env!("CONTROL_INITIAL_VOLUME").parse()
                .map_err(|_| "Failed to parse CONTROL_INITIAL_VOLUME")?,

            token_file: env!("DRIVER_TOKEN_FILE"),
        })
    }
}

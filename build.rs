use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Settings {
    tv: Tv,
    audio: Audio,
    control: Control,
    driver: Driver,
}

#[derive(Deserialize)]
struct Tv {
    app_name: String,
    ip_addr: String,
    mac_addr: String,
    port: u16,
    status_port: u16,
    subnet: String,
    debug: bool,
}

#[derive(Deserialize)]
struct Audio {
    device_index: usize,
    sample_rate: u32,
    channels: u32,
    sample_bits: u32,
    scale: f64,
}

#[derive(Deserialize)]
struct Control {
    low: f64,
    high: f64,
    low_hysteresis: f64,
    high_hysteresis: f64,
    max_volume: i32,
    initial_volume: i32,
}

#[derive(Deserialize)]
struct Driver {
    token_file: String,
}

// 在编译时读取 config.toml（可被 TVVOL__SECTION__KEY 环境变量覆盖）并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let settings: Settings = config::Config::builder()
        .add_source(config::File::new("config.toml", config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("TVVOL")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize())
        .expect("Failed to load config.toml");

    // 电视信息
    println!("cargo:rustc-env=TV_APP_NAME={}", settings.tv.app_name);
    println!("cargo:rustc-env=TV_IP_ADDR={}", settings.tv.ip_addr);
    println!("cargo:rustc-env=TV_MAC_ADDR={}", settings.tv.mac_addr);
    println!("cargo:rustc-env=TV_PORT={}", settings.tv.port);
    println!("cargo:rustc-env=TV_STATUS_PORT={}", settings.tv.status_port);
    println!("cargo:rustc-env=TV_SUBNET={}", settings.tv.subnet);
    println!("cargo:rustc-env=TV_DEBUG={}", settings.tv.debug);

    // 音频配置
    println!("cargo:rustc-env=AUDIO_DEVICE_INDEX={}", settings.audio.device_index);
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", settings.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_CHANNELS={}", settings.audio.channels);
    println!("cargo:rustc-env=AUDIO_SAMPLE_BITS={}", settings.audio.sample_bits);
    println!("cargo:rustc-env=AUDIO_SCALE={}", settings.audio.scale);

    // 音量控制
    println!("cargo:rustc-env=CONTROL_LOW={}", settings.control.low);
    println!("cargo:rustc-env=CONTROL_HIGH={}", settings.control.high);
    println!("cargo:rustc-env=CONTROL_LOW_HYSTERESIS={}", settings.control.low_hysteresis);
    println!("cargo:rustc-env=CONTROL_HIGH_HYSTERESIS={}", settings.control.high_hysteresis);
    println!("cargo:rustc-env=CONTROL_MAX_VOLUME={}", settings.control.max_volume);
    println!("cargo:rustc-env=CONTROL_INITIAL_VOLUME={}", settings.control.initial_volume);

    println!("cargo:rustc-env=DRIVER_TOKEN_FILE={}", settings.driver.token_file);
}

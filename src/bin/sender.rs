//! SARQ 송신자
//!
//! 파일 하나를 수신자에게 보내고 모든 프레임이 ACK되면 종료
//!
//! 사용법:
//!   cargo run --release --bin sarq-sender -- <HOST> <PORT> <SRC> <DEST> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin sarq-sender -- 127.0.0.1 9000 ./data.bin received.bin
//!   cargo run --release --bin sarq-sender -- 10.0.0.2 9000 ./data.bin data.bin --window 8192 --interval-ms 100

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sarq::socket::resolve;
use sarq::{Config, Sender};

const USAGE: &str = r#"SARQ Sender - UDP 슬라이딩 윈도우 파일 전송

사용법:
  sarq-sender <HOST> <PORT> <SRC> <DEST> [OPTIONS]

인자:
  <HOST>                 수신자 호스트
  <PORT>                 수신자 포트
  <SRC>                  보낼 파일
  <DEST>                 수신측에 생성할 파일 이름

옵션:
  --window <N>           윈도우 크기 (기본: 4096 프레임)
  --interval-ms <MS>     재전송 주기 (기본: 40ms)
  --preset <NAME>        설정 프리셋: default, lan, high-latency
  -h, --help             이 도움말 출력
"#;

/// 송신자 실행 인자
struct SenderArgs {
    host: String,
    port: u16,
    source: PathBuf,
    dest_name: String,
    config: Config,
}


fn parse_args(args: &[String]) -> Result<SenderArgs, Box<dyn std::error::Error>> {
    // 프리셋 위치와 상관없이 개별 옵션이 프리셋을 덮어씀
    let preset = args
        .iter()
        .position(|arg| arg == "--preset")
        .and_then(|i| args.get(i + 1));
    let mut config = match preset {
        Some(name) => Config::preset(name).ok_or_else(|| format!("알 수 없는 프리셋: {}", name))?,
        None => Config::default(),
    };
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--preset" => {
                args.get(i + 1).ok_or("--preset 값 필요")?;
                i += 1;
            }
            "--window" | "-w" => {
                let value = args.get(i + 1).ok_or("--window 값 필요")?;
                config = config.with_window_size(value.parse()?);
                i += 1;
            }
            "--interval-ms" => {
                let value = args.get(i + 1).ok_or("--interval-ms 값 필요")?;
                config = config.with_retransmit_interval(Duration::from_millis(value.parse()?));
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => positional.push(other.to_owned()),
        }
        i += 1;
    }

    let [host, port, source, dest_name]: [String; 4] = match positional.try_into() {
        Ok(positional) => positional,
        Err(_) => {
            eprintln!("{}", USAGE);
            return Err("인자 4개 필요: <HOST> <PORT> <SRC> <DEST>".into());
        }
    };

    Ok(SenderArgs {
        host,
        port: port.parse()?,
        source: PathBuf::from(source),
        dest_name,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG로 변경 가능)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args(&std::env::args().collect::<Vec<_>>())?;

    info!("SARQ Sender starting...");
    info!("  Window size: {} frames", args.config.window_size);
    info!("  Retransmit interval: {}ms", args.config.retransmit_interval_ms);

    let target = resolve(&args.host, args.port).await?;
    let sender = Sender::connect(target, args.config)?;
    let stats = sender.send_file(&args.source, &args.dest_name).await?;

    info!("Transfer complete!");
    info!("  Time: {:.2}s", stats.elapsed().as_secs_f64());
    info!("  Bytes: {}", stats.total_bytes);
    info!("  Frames: {}", stats.frames_sent);
    info!(
        "  Retransmits: {} ({:.1}%)",
        stats.retransmitted_frames,
        stats.retransmit_ratio() * 100.0
    );
    info!("  Throughput: {:.2} MB/s", stats.throughput() / 1_000_000.0);

    Ok(())
}

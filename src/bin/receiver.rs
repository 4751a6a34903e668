//! SARQ 수신자
//!
//! 파일 하나를 받아 출력 디렉터리에 기록하고, 송신자가 조용해지면 종료
//!
//! 사용법:
//!   cargo run --release --bin sarq-receiver -- <PORT> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin sarq-receiver -- 9000
//!   cargo run --release --bin sarq-receiver -- 9000 --output-dir ./incoming --linger-ms 5000

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sarq::{Config, Receiver};

const USAGE: &str = r#"SARQ Receiver - UDP 슬라이딩 윈도우 파일 수신

사용법:
  sarq-receiver <PORT> [OPTIONS]

인자:
  <PORT>                 수신 포트

옵션:
  -o, --output-dir <DIR> 파일을 생성할 디렉터리 (기본: 현재 디렉터리)
  --window <N>           수신 윈도우 크기 (기본: 4096 프레임, 송신자와 같아야 함)
  --linger-ms <MS>       완료 후 대기 시간 (기본: 2000ms)
  --preset <NAME>        설정 프리셋: default, lan, high-latency
  -h, --help             이 도움말 출력
"#;

/// 수신자 실행 인자
struct ReceiverArgs {
    port: u16,
    output_dir: PathBuf,
    config: Config,
}


fn parse_args(args: &[String]) -> Result<ReceiverArgs, Box<dyn std::error::Error>> {
    // 프리셋 위치와 상관없이 개별 옵션이 프리셋을 덮어씀
    let preset = args
        .iter()
        .position(|arg| arg == "--preset")
        .and_then(|i| args.get(i + 1));
    let mut config = match preset {
        Some(name) => Config::preset(name).ok_or_else(|| format!("알 수 없는 프리셋: {}", name))?,
        None => Config::default(),
    };
    let mut output_dir = PathBuf::from(".");
    let mut port = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--preset" => {
                args.get(i + 1).ok_or("--preset 값 필요")?;
                i += 1;
            }
            "--output-dir" | "-o" => {
                let value = args.get(i + 1).ok_or("--output-dir 값 필요")?;
                output_dir = PathBuf::from(value);
                i += 1;
            }
            "--window" | "-w" => {
                let value = args.get(i + 1).ok_or("--window 값 필요")?;
                config = config.with_window_size(value.parse()?);
                i += 1;
            }
            "--linger-ms" => {
                let value = args.get(i + 1).ok_or("--linger-ms 값 필요")?;
                config = config.with_completion_linger(Duration::from_millis(value.parse()?));
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other if port.is_none() => port = Some(other.parse::<u16>()?),
            other => return Err(format!("알 수 없는 인자: {}", other).into()),
        }
        i += 1;
    }

    let port = match port {
        Some(port) => port,
        None => {
            eprintln!("{}", USAGE);
            return Err("<PORT> 인자 필요".into());
        }
    };

    Ok(ReceiverArgs {
        port,
        output_dir,
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

    info!("SARQ Receiver starting...");
    info!("  Output directory: {:?}", args.output_dir);
    info!("  Window size: {} frames", args.config.window_size);

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);
    let receiver = Receiver::bind(bind_addr, args.output_dir, args.config)?;
    let outcome = receiver.run().await?;

    info!("Transfer complete!");
    info!("  File: {:?}", outcome.path);
    info!("  Time: {:.2}s", outcome.stats.elapsed().as_secs_f64());
    info!("  Bytes: {}", outcome.stats.total_bytes);
    info!("  Frames: {}", outcome.stats.frames_received);
    info!(
        "  Dropped: {} corrupt, {} out-of-window, {} duplicates",
        outcome.stats.corrupt_frames, outcome.stats.out_of_window_frames, outcome.stats.duplicate_frames
    );
    info!("  Throughput: {:.2} MB/s", outcome.stats.throughput() / 1_000_000.0);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sarq-receiver")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_overrides_survive_later_preset() {
        let parsed = parse_args(&args(&[
            "9000", "--linger-ms", "100", "--preset", "high-latency",
        ]))
        .unwrap();

        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.config.completion_linger_ms, 100);
        assert_eq!(parsed.config.window_size, 8192);
        assert_eq!(parsed.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_requires_port() {
        assert!(parse_args(&args(&["--window", "16"])).is_err());
    }
}

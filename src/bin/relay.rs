//! SARQ 손실 릴레이
//!
//! 송신자와 수신자 사이에 두고 손실/중복/재정렬/손상을 주입
//!
//! 사용법:
//!   cargo run --release --bin sarq-relay -- --listen <ADDR> --upstream <ADDR> [OPTIONS]
//!
//! 예시:
//!   # 수신자는 9000, 송신자는 9100으로 전송
//!   cargo run --release --bin sarq-relay -- --listen 127.0.0.1:9100 --upstream 127.0.0.1:9000 --loss 0.1 --reorder 0.05

use std::net::SocketAddr;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sarq::{LossyRelay, RelayConfig};

const USAGE: &str = r#"SARQ Relay - 장애 주입 UDP 릴레이

사용법:
  sarq-relay --listen <ADDR> --upstream <ADDR> [OPTIONS]

옵션:
  --listen <ADDR>        송신자가 보낼 주소
  --upstream <ADDR>      수신자 주소
  --loss <P>             손실 확률 (기본: 0)
  --duplicate <P>        중복 확률 (기본: 0)
  --reorder <P>          재정렬 확률 (기본: 0)
  --corrupt <P>          비트 손상 확률 (기본: 0)
  --seed <N>             난수 시드 (재현용)
  -h, --help             이 도움말 출력
"#;

/// 릴레이 실행 인자
struct RelayArgs {
    listen: SocketAddr,
    upstream: SocketAddr,
    config: RelayConfig,
}

fn parse_args() -> Result<RelayArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RelayConfig::default();
    let mut listen = None;
    let mut upstream = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--help" || flag == "-h" {
            println!("{}", USAGE);
            std::process::exit(0);
        }

        let value = args
            .get(i + 1)
            .ok_or_else(|| format!("{} 값 필요", flag))?;
        match flag {
            "--listen" | "-l" => listen = Some(value.parse()?),
            "--upstream" | "-u" => upstream = Some(value.parse()?),
            "--loss" => config.loss_rate = value.parse()?,
            "--duplicate" => config.duplicate_rate = value.parse()?,
            "--reorder" => config.reorder_rate = value.parse()?,
            "--corrupt" => config.corrupt_rate = value.parse()?,
            "--seed" => config.seed = Some(value.parse()?),
            other => return Err(format!("알 수 없는 옵션: {}", other).into()),
        }
        i += 2;
    }

    match (listen, upstream) {
        (Some(listen), Some(upstream)) => Ok(RelayArgs {
            listen,
            upstream,
            config,
        }),
        _ => {
            eprintln!("{}", USAGE);
            Err("--listen과 --upstream 필요".into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG로 변경 가능)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    let relay = LossyRelay::bind(args.listen, args.upstream, args.config)?;
    relay.run().await?;

    Ok(())
}

use clap::Parser;

/// 配额网关命令行参数
#[derive(Parser, Debug)]
#[command(name = "quota-gateway", version, about = "带配额控制和凭据轮换的 LLM 网关")]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,

    /// 覆盖配置中的监听地址
    #[arg(long)]
    pub host: Option<String>,

    /// 覆盖配置中的监听端口
    #[arg(short, long)]
    pub port: Option<u16>,
}

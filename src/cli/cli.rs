use clap::Parser;
use std::time::Duration;

/// procwatch - 进程采集、存储与实时推送
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// SQLite 数据库地址
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://processes.db")]
    pub database_url: String,

    /// 连接池大小
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// 进程采集间隔（秒）
    #[arg(long, env = "COLLECT_INTERVAL", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub collect_interval: u64,

    /// 实时推送间隔（秒）
    #[arg(long, env = "REALTIME_INTERVAL", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub realtime_interval: u64,

    /// 分页参数 limit 的上限
    #[arg(long, env = "MAX_PAGE_SIZE", default_value_t = 100)]
    pub max_page_size: i64,

    /// 单次查询超时（秒）
    #[arg(long, env = "QUERY_TIMEOUT", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub query_timeout: u64,
}

impl CommandArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn collect_every(&self) -> Duration {
        Duration::from_secs(self.collect_interval)
    }

    pub fn realtime_every(&self) -> Duration {
        Duration::from_secs(self.realtime_interval)
    }

    pub fn query_deadline(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

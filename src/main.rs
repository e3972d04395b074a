// 菜单栏布局缓存 - 命令行入口

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    menubar_layout_lib::app::run().await
}

/*!
 * Extended squitter payloads, one module per broadcast register.
 *
 * | Register | Content                    | Typecode      |
 * | -------- | -------------------------- | ------------- |
 * | BDS 0,5  | airborne position          | 9..=18, 20..=22 |
 * | BDS 0,6  | surface position           | 5..=8         |
 * | BDS 0,8  | identification & category  | 1..=4         |
 * | BDS 0,9  | airborne velocity          | 19            |
 * | BDS 6,1  | aircraft status            | 28            |
 * | BDS 6,2  | target state and status    | 29            |
 * | BDS 6,5  | operational status         | 31            |
 */
pub mod bds05;
pub mod bds06;
pub mod bds08;
pub mod bds09;
pub mod bds61;
pub mod bds62;
pub mod bds65;
